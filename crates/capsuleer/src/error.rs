// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes shared by the local API and the backend client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Unauthorized,
    BadRequest,
    NotFound,
    NotReady,
    BackendError,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::NotReady => 503,
            Self::BackendError => 502,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::NotReady => "NOT_READY",
            Self::BackendError => "BACKEND_ERROR",
            Self::Internal => "INTERNAL",
        }
    }

    /// Classify a non-success status returned by the backend.
    pub fn from_backend_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            400 | 409 | 422 => Self::BadRequest,
            404 => Self::NotFound,
            425 | 503 => Self::NotReady,
            500..=599 => Self::BackendError,
            _ => Self::Internal,
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// A non-success response from the backend.
///
/// The message is taken from the `{"error": {"message"}}` envelope when the
/// body parses as one, otherwise the raw body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn from_response_text(status: u16, text: &str) -> Self {
        let message = match serde_json::from_str::<ErrorResponse>(text) {
            Ok(envelope) => envelope.error.message,
            Err(_) => text.trim().to_owned(),
        };
        Self { status, code: ErrorCode::from_backend_status(status), message }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "backend returned {} ({})", self.status, self.code)
        } else {
            write!(f, "backend returned {} ({}): {}", self.status, self.code, self.message)
        }
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
