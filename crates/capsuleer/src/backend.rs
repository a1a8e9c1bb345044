// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the capsuleer backend REST API.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::appdata::AppData;
use crate::config::BackendConfig;
use crate::error::ApiError;
use crate::finalize::{FinalizeApi, FlowKind};

/// Server-issued authorization handle returned by `/api/login` and
/// `/api/add-character`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Opaque correlation token for the later finalize call.
    pub state: String,
    /// SSO page the user has to open in a browser.
    #[serde(rename = "redirectURL")]
    pub redirect_url: String,
}

#[derive(Debug, Serialize)]
struct InitiateBody<'a> {
    account: &'a str,
}

/// HTTP client wrapper for the backend.
pub struct BackendClient {
    base_url: String,
    auth_token: Option<String>,
    client: Client,
}

impl BackendClient {
    pub fn new(base_url: String, auth_token: Option<String>, timeout: Duration) -> Self {
        crate::install_crypto_provider();
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { base_url: base_url.trim_end_matches('/').to_owned(), auth_token, client }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(
            config.backend_url.clone(),
            config.backend_token.clone(),
            config.request_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Send a request and turn any non-success status into an [`ApiError`].
    async fn send(&self, req: reqwest::RequestBuilder) -> anyhow::Result<reqwest::Response> {
        let resp = self.apply_auth(req).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        Err(ApiError::from_response_text(status.as_u16(), &text).into())
    }

    /// Begin an OAuth authorization for `account`.
    pub async fn begin_authorization(
        &self,
        kind: FlowKind,
        account: &str,
    ) -> anyhow::Result<AuthorizationRequest> {
        let req = self.client.post(self.url(kind.initiate_path())).json(&InitiateBody { account });
        let resp = self.send(req).await?;
        let auth: AuthorizationRequest = resp.json().await?;
        if auth.state.is_empty() {
            anyhow::bail!("backend returned an empty authorization state");
        }
        Ok(auth)
    }

    /// Ask the backend to complete the token exchange for `state`.
    ///
    /// Only the status is inspected; the body is discarded.
    pub async fn finalize_login(&self, state: &str) -> anyhow::Result<()> {
        let mut url = Url::parse(&self.url("/api/finalize-login"))?;
        url.query_pairs_mut().append_pair("state", state);
        self.send(self.client.post(url)).await?;
        Ok(())
    }

    /// Fetch a fresh application snapshot, bypassing backend caches.
    pub async fn fetch_app_data(&self) -> anyhow::Result<AppData> {
        let resp = self.send(self.client.get(self.url("/api/app-data-no-cache"))).await?;
        let data: AppData = resp.json().await?;
        Ok(data)
    }

    /// End the backend session.
    pub async fn logout(&self) -> anyhow::Result<()> {
        self.send(self.client.post(self.url("/api/logout"))).await?;
        Ok(())
    }
}

impl FinalizeApi for BackendClient {
    fn finalize<'a>(&'a self, state: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        self.finalize_login(state).boxed()
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
