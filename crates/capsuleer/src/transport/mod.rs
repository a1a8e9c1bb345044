// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the local control API.

pub mod auth;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with all control routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        .route("/api/v1/session", get(http::session))
        // Flows
        .route("/api/v1/login", post(http::login))
        .route("/api/v1/add-character", post(http::add_character))
        .route("/api/v1/flow", get(http::flow_status).delete(http::cancel_flow))
        .route("/api/v1/flow/finalize", post(http::finalize))
        .route("/api/v1/logout", post(http::logout))
        // Cached backend data
        .route("/api/v1/app-data", get(http::app_data))
        // Event stream (auth via ?token=)
        .route("/ws/events", get(ws::ws_handler))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
