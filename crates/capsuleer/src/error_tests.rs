// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{ApiError, ErrorCode};

#[yare::parameterized(
    unauthorized = { 401, ErrorCode::Unauthorized },
    forbidden = { 403, ErrorCode::Unauthorized },
    bad_request = { 400, ErrorCode::BadRequest },
    conflict = { 409, ErrorCode::BadRequest },
    not_found = { 404, ErrorCode::NotFound },
    too_early = { 425, ErrorCode::NotReady },
    unavailable = { 503, ErrorCode::NotReady },
    internal = { 500, ErrorCode::BackendError },
    bad_gateway = { 502, ErrorCode::BackendError },
    teapot = { 418, ErrorCode::Internal },
)]
fn classifies_backend_status(status: u16, expected: ErrorCode) {
    assert_eq!(ErrorCode::from_backend_status(status), expected);
}

#[test]
fn http_status_round_trips_through_classification() {
    for code in [
        ErrorCode::Unauthorized,
        ErrorCode::BadRequest,
        ErrorCode::NotFound,
        ErrorCode::NotReady,
        ErrorCode::BackendError,
    ] {
        assert_eq!(ErrorCode::from_backend_status(code.http_status()), code);
    }
}

#[test]
fn api_error_reads_envelope_message() {
    let err = ApiError::from_response_text(
        400,
        r#"{"error":{"code":"BAD_REQUEST","message":"unknown account"}}"#,
    );
    assert_eq!(err.code, ErrorCode::BadRequest);
    assert_eq!(err.message, "unknown account");
    assert_eq!(err.to_string(), "backend returned 400 (BAD_REQUEST): unknown account");
}

#[test]
fn api_error_falls_back_to_plain_text() {
    let err = ApiError::from_response_text(500, "  esi unavailable\n");
    assert_eq!(err.code, ErrorCode::BackendError);
    assert_eq!(err.message, "esi unavailable");
}

#[test]
fn api_error_without_body() {
    let err = ApiError::from_response_text(503, "");
    assert_eq!(err.to_string(), "backend returned 503 (NOT_READY)");
}
