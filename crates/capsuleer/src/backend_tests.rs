// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use serde_json::json;

use super::*;
use crate::error::ErrorCode;
use crate::test_support::{app_data_with_characters, spawn_mock_backend, MockBackendConfig};

fn client(url: String) -> BackendClient {
    BackendClient::new(url, None, Duration::from_secs(5))
}

#[tokio::test]
async fn begin_login_posts_account_and_parses_state() -> anyhow::Result<()> {
    let backend = spawn_mock_backend(MockBackendConfig::default()).await?;
    let client = client(backend.url());

    let auth = client.begin_authorization(FlowKind::Login, "main").await?;
    assert_eq!(auth.state, "abc123");
    assert_eq!(auth.redirect_url, "https://login.example/sso?state=abc123");
    assert_eq!(backend.log.snapshot(), ["login:main"]);
    Ok(())
}

#[tokio::test]
async fn begin_add_character_uses_its_endpoint() -> anyhow::Result<()> {
    let backend = spawn_mock_backend(MockBackendConfig::default()).await?;
    let client = client(format!("{}/", backend.url()));

    client.begin_authorization(FlowKind::AddCharacter, "alts").await?;
    assert_eq!(backend.log.snapshot(), ["add_character:alts"]);
    Ok(())
}

#[tokio::test]
async fn begin_surfaces_backend_error_text() -> anyhow::Result<()> {
    let backend = spawn_mock_backend(MockBackendConfig {
        initiate: (400, json!({ "error": { "code": "BAD_REQUEST", "message": "unknown account" } })),
        ..Default::default()
    })
    .await?;
    let client = client(backend.url());

    let err = match client.begin_authorization(FlowKind::Login, "ghost").await {
        Ok(auth) => anyhow::bail!("expected error, got {auth:?}"),
        Err(e) => e,
    };
    let api = err.downcast_ref::<ApiError>().ok_or_else(|| anyhow::anyhow!("not an ApiError"))?;
    assert_eq!(api.code, ErrorCode::BadRequest);
    assert_eq!(api.message, "unknown account");
    Ok(())
}

#[tokio::test]
async fn begin_rejects_empty_state() -> anyhow::Result<()> {
    let backend = spawn_mock_backend(MockBackendConfig {
        initiate: (200, json!({ "redirectURL": "https://login.example", "state": "" })),
        ..Default::default()
    })
    .await?;
    let client = client(backend.url());

    crate::assert_err_contains!(
        client.begin_authorization(FlowKind::Login, "main").await,
        "empty authorization state"
    );
    Ok(())
}

#[tokio::test]
async fn finalize_passes_state_as_query() -> anyhow::Result<()> {
    let backend = spawn_mock_backend(MockBackendConfig {
        finalize: vec![425, 200],
        ..Default::default()
    })
    .await?;
    let client = client(backend.url());

    assert!(client.finalize_login("a b&c").await.is_err());
    client.finalize_login("a b&c").await?;
    assert_eq!(backend.log.snapshot(), ["finalize:a b&c", "finalize:a b&c"]);
    Ok(())
}

#[tokio::test]
async fn fetch_app_data_keeps_unknown_fields() -> anyhow::Result<()> {
    let backend = spawn_mock_backend(MockBackendConfig {
        app_data: vec![(200, app_data_with_characters(3))],
        ..Default::default()
    })
    .await?;
    let client = client(backend.url());

    let data = client.fetch_app_data().await?;
    assert_eq!(data.character_count(), 3);
    assert_eq!(data.accounts[0].name, "main");
    assert_eq!(data.accounts[0].characters[2].character_name, "Pilot 2");
    assert!(data.extra.contains_key("skillPlans"));
    Ok(())
}

#[tokio::test]
async fn unreachable_backend_is_an_error() {
    // Port 9 (discard) is essentially never listening on loopback.
    let client = client("http://127.0.0.1:9".to_owned());
    assert!(client.fetch_app_data().await.is_err());
    assert!(client.finalize_login("s").await.is_err());
}
