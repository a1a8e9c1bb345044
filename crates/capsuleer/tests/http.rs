// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the local control API.
//!
//! The API is served through `axum_test::TestServer`; the backend is a mock
//! axum server on a loopback port.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use capsuleer::backend::BackendClient;
use capsuleer::events::AuthEvent;
use capsuleer::finalize::PollPolicy;
use capsuleer::flow::{wait_for_terminal, FlowManager};
use capsuleer::state::AppState;
use capsuleer::test_support::{spawn_mock_backend, AnyhowExt, MockBackend, MockBackendConfig};
use capsuleer::transport::build_router;

fn slow_policy() -> PollPolicy {
    PollPolicy { interval: Duration::from_secs(60), max_attempts: 5, final_refresh: false }
}

fn test_state(backend: &MockBackend, policy: PollPolicy, auth_token: Option<&str>) -> Arc<AppState> {
    let client = BackendClient::new(backend.url(), None, Duration::from_secs(5));
    let shutdown = CancellationToken::new();
    let flows = FlowManager::new(Arc::new(client), policy, shutdown.clone());
    Arc::new(AppState::new(flows, auth_token.map(str::to_owned), shutdown))
}

fn test_server(state: Arc<AppState>) -> anyhow::Result<TestServer> {
    TestServer::new(build_router(state)).anyhow()
}

#[tokio::test]
async fn health_reports_idle() -> anyhow::Result<()> {
    let backend = spawn_mock_backend(MockBackendConfig::default()).await?;
    let server = test_server(test_state(&backend, slow_policy(), None))?;

    let resp = server.get("/api/v1/health").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "running");
    assert_eq!(body["flow_active"], false);
    Ok(())
}

#[tokio::test]
async fn auth_required_except_health() -> anyhow::Result<()> {
    let backend = spawn_mock_backend(MockBackendConfig::default()).await?;
    let server = test_server(test_state(&backend, slow_policy(), Some("secret")))?;

    server.get("/api/v1/health").await.assert_status_ok();

    let resp = server.get("/api/v1/session").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let resp = server
        .get("/api/v1/session")
        .add_header(
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderValue::from_static("Bearer secret"),
        )
        .await;
    resp.assert_status_ok();
    Ok(())
}

#[tokio::test]
async fn session_starts_unauthenticated() -> anyhow::Result<()> {
    let backend = spawn_mock_backend(MockBackendConfig::default()).await?;
    let server = test_server(test_state(&backend, slow_policy(), None))?;

    let resp = server.get("/api/v1/session").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["is_authenticated"], false);
    assert_eq!(body["logged_out"], false);
    assert!(body.get("active_flow").is_none());
    Ok(())
}

#[tokio::test]
async fn login_returns_ticket_and_tracks_flow() -> anyhow::Result<()> {
    let backend = spawn_mock_backend(MockBackendConfig::default()).await?;
    let state = test_state(&backend, slow_policy(), None);
    let server = test_server(Arc::clone(&state))?;

    let resp = server.post("/api/v1/login").json(&json!({ "account": "main" })).await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["kind"], "login");
    assert_eq!(body["redirect_url"], "https://login.example/sso?state=abc123");
    let flow_id = body["flow_id"].as_str().unwrap_or_default().to_owned();
    assert!(!flow_id.is_empty());

    let resp = server.get("/api/v1/flow").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["active"]["flow_id"], flow_id.as_str());
    assert_eq!(body["active"]["kind"], "login");

    let body: serde_json::Value = server.get("/api/v1/health").await.json();
    assert_eq!(body["flow_active"], true);

    assert_eq!(backend.log.snapshot(), ["login:main"]);
    Ok(())
}

#[tokio::test]
async fn blank_account_is_rejected() -> anyhow::Result<()> {
    let backend = spawn_mock_backend(MockBackendConfig::default()).await?;
    let server = test_server(test_state(&backend, slow_policy(), None))?;

    let resp = server.post("/api/v1/add-character").json(&json!({ "account": "  " })).await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(backend.log.snapshot().is_empty());
    Ok(())
}

#[tokio::test]
async fn backend_failure_maps_to_bad_gateway() -> anyhow::Result<()> {
    let backend = spawn_mock_backend(MockBackendConfig {
        initiate: (500, json!({ "error": { "code": "INTERNAL", "message": "boom" } })),
        ..Default::default()
    })
    .await?;
    let state = test_state(&backend, slow_policy(), None);
    let server = test_server(Arc::clone(&state))?;

    let resp = server.post("/api/v1/login").json(&json!({ "account": "main" })).await;
    resp.assert_status(StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "BACKEND_ERROR");
    assert!(body["error"]["message"].as_str().unwrap_or_default().contains("boom"));
    assert!(state.flows.active_flow().await.is_none());
    Ok(())
}

#[tokio::test]
async fn empty_state_is_rejected() -> anyhow::Result<()> {
    let backend = spawn_mock_backend(MockBackendConfig::default()).await?;
    let server = test_server(test_state(&backend, slow_policy(), None))?;

    let resp = server
        .post("/api/v1/flow/finalize")
        .json(&json!({ "kind": "login", "state": "" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn finalize_external_state_completes() -> anyhow::Result<()> {
    let backend = spawn_mock_backend(MockBackendConfig::default()).await?;
    let policy = PollPolicy { interval: Duration::from_millis(20), max_attempts: 5, final_refresh: true };
    let state = test_state(&backend, policy, None);
    let mut rx = state.flows.subscribe();
    let server = test_server(Arc::clone(&state))?;

    let resp = server
        .post("/api/v1/flow/finalize")
        .json(&json!({ "kind": "login", "state": "xyz" }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    let flow_id = body["flow_id"].as_str().unwrap_or_default().parse()?;

    let event = tokio::time::timeout(Duration::from_secs(5), wait_for_terminal(&mut rx, flow_id))
        .await?
        .ok_or_else(|| anyhow::anyhow!("event channel closed"))?;
    assert!(matches!(event, AuthEvent::FlowCompleted { attempts: 1, .. }));

    let body: serde_json::Value = server.get("/api/v1/session").await.json();
    assert_eq!(body["is_authenticated"], true);
    Ok(())
}

#[tokio::test]
async fn delete_flow_cancels() -> anyhow::Result<()> {
    let backend = spawn_mock_backend(MockBackendConfig::default()).await?;
    let server = test_server(test_state(&backend, slow_policy(), None))?;

    let body: serde_json::Value = server.delete("/api/v1/flow").await.json();
    assert_eq!(body["cancelled"], false);

    server.post("/api/v1/login").json(&json!({ "account": "main" })).await.assert_status_ok();

    let resp = server.delete("/api/v1/flow").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["cancelled"], true);

    let body: serde_json::Value = server.get("/api/v1/flow").await.json();
    assert!(body["active"].is_null());
    Ok(())
}

#[tokio::test]
async fn app_data_not_ready_until_fetched() -> anyhow::Result<()> {
    let backend = spawn_mock_backend(MockBackendConfig::default()).await?;
    let state = test_state(&backend, slow_policy(), None);
    let server = test_server(Arc::clone(&state))?;

    let resp = server.get("/api/v1/app-data").await;
    resp.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "NOT_READY");

    state.flows.app_data().refresh().await?;

    let resp = server.get("/api/v1/app-data").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["accounts"][0]["name"], "main");
    assert_eq!(body["accounts"][0]["characters"][0]["characterName"], "Pilot 0");
    Ok(())
}

#[tokio::test]
async fn logout_clears_session() -> anyhow::Result<()> {
    let backend = spawn_mock_backend(MockBackendConfig::default()).await?;
    let state = test_state(&backend, slow_policy(), None);
    state.flows.session().mark_authenticated().await;
    let server = test_server(Arc::clone(&state))?;

    let resp = server.post("/api/v1/logout").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["logged_out"], true);
    assert_eq!(body["backend_acknowledged"], true);

    let body: serde_json::Value = server.get("/api/v1/session").await.json();
    assert_eq!(body["is_authenticated"], false);
    assert_eq!(body["logged_out"], true);
    assert_eq!(backend.log.snapshot(), ["logout"]);
    Ok(())
}
