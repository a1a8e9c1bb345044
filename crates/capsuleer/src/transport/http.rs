// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the local control API.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::finalize::FlowKind;
use crate::flow::FlowInfo;
use crate::session::SessionState;
use crate::state::AppState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub flow_active: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_flow: Option<FlowInfo>,
}

#[derive(Debug, Deserialize)]
pub struct AccountRequest {
    pub account: String,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub kind: FlowKind,
    pub state: String,
}

#[derive(Debug, Serialize)]
pub struct FinalizeResponse {
    pub flow_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct FlowStatusResponse {
    pub active: Option<FlowInfo>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub logged_out: bool,
    pub backend_acknowledged: bool,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let flow_active = s.flows.active_flow().await.is_some();
    Json(HealthResponse { status: "running".to_owned(), flow_active })
}

/// `GET /api/v1/session`
pub async fn session(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let session = s.flows.session().snapshot().await;
    let active_flow = s.flows.active_flow().await;
    Json(SessionResponse { session, active_flow })
}

/// `POST /api/v1/login`: initiate a login and start polling.
pub async fn login(
    State(s): State<Arc<AppState>>,
    Json(req): Json<AccountRequest>,
) -> axum::response::Response {
    begin_flow(&s, FlowKind::Login, &req.account).await
}

/// `POST /api/v1/add-character`: initiate an add-character flow.
pub async fn add_character(
    State(s): State<Arc<AppState>>,
    Json(req): Json<AccountRequest>,
) -> axum::response::Response {
    begin_flow(&s, FlowKind::AddCharacter, &req.account).await
}

async fn begin_flow(s: &AppState, kind: FlowKind, account: &str) -> axum::response::Response {
    let account = account.trim();
    if account.is_empty() {
        return ErrorCode::BadRequest.to_http_response("account must not be empty").into_response();
    }
    match s.flows.begin(kind, account).await {
        Ok(ticket) => Json(ticket).into_response(),
        Err(e) => ErrorCode::BackendError.to_http_response(format!("{e:#}")).into_response(),
    }
}

/// `POST /api/v1/flow/finalize`: poll for a `state` obtained elsewhere.
pub async fn finalize(
    State(s): State<Arc<AppState>>,
    Json(req): Json<FinalizeRequest>,
) -> axum::response::Response {
    if req.state.trim().is_empty() {
        return ErrorCode::BadRequest.to_http_response("state must not be empty").into_response();
    }
    match s.flows.start_finalization(req.kind, req.state).await {
        Ok(flow_id) => Json(FinalizeResponse { flow_id }).into_response(),
        Err(e) => ErrorCode::Internal.to_http_response(format!("{e:#}")).into_response(),
    }
}

/// `GET /api/v1/flow`
pub async fn flow_status(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(FlowStatusResponse { active: s.flows.active_flow().await })
}

/// `DELETE /api/v1/flow`
pub async fn cancel_flow(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(CancelResponse { cancelled: s.flows.cancel().await })
}

/// `POST /api/v1/logout`
pub async fn logout(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let backend_acknowledged = s.flows.logout().await;
    Json(LogoutResponse { logged_out: true, backend_acknowledged })
}

/// `GET /api/v1/app-data`: last snapshot fetched from the backend.
pub async fn app_data(State(s): State<Arc<AppState>>) -> axum::response::Response {
    match s.flows.app_data().snapshot().await {
        Some(data) => Json(data).into_response(),
        None => ErrorCode::NotReady.to_http_response("app data not yet fetched").into_response(),
    }
}
