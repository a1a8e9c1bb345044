// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ErrorCode;
use crate::state::AppState;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a Bearer token from HTTP headers.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ErrorCode> {
    let expected = match expected {
        Some(tok) => tok,
        None => return Ok(()),
    };

    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(ErrorCode::Unauthorized)?;

    let token = header.strip_prefix("Bearer ").ok_or(ErrorCode::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(ErrorCode::Unauthorized)
    }
}

/// Validate the `token` query parameter of a WebSocket upgrade.
pub fn validate_ws_token(token: Option<&str>, expected: Option<&str>) -> Result<(), ErrorCode> {
    match (expected, token) {
        (None, _) => Ok(()),
        (Some(expected), Some(token)) if constant_time_eq(token, expected) => Ok(()),
        _ => Err(ErrorCode::Unauthorized),
    }
}

/// Axum middleware that enforces Bearer token authentication.
///
/// Exempt: `/api/v1/health` and WebSocket upgrades (`/ws/`), which
/// authenticate with `?token=` in their handler.
pub async fn auth_layer(
    state: State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path == "/api/v1/health" || path.starts_with("/ws/") {
        return next.run(req).await;
    }

    if let Err(code) = validate_bearer(req.headers(), state.auth_token.as_deref()) {
        return code.to_http_response("unauthorized").into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
