//! Gateway error responses.
//!
//! Bridges internal failures into the wire shape
//! `{ "error": <code>, "message": <text> }` via Axum's `IntoResponse`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// A gateway error: status plus the structured body.
#[derive(Debug)]
pub struct GatewayError {
    status: StatusCode,
    error: String,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

impl GatewayError {
    /// Create an error with an explicit status and code.
    #[must_use]
    pub fn new(status: StatusCode, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            message: message.into(),
        }
    }

    /// 400 — the request body failed validation.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 401 — missing or wrong bearer token.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "missing or invalid bearer token",
        )
    }

    /// 413 — the request body exceeds the configured cap.
    #[must_use]
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "PAYLOAD_TOO_LARGE",
            message,
        )
    }

    /// 422 — the batch exceeds the configured cap.
    #[must_use]
    pub fn batch_too_large(got: usize, cap: usize) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "BATCH_TOO_LARGE",
            format!("batch of {got} records exceeds the cap of {cap}"),
        )
    }

    /// 500 — a publish to the bus failed.
    #[must_use]
    pub fn publish_failed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "PUBLISH_FAILED", message)
    }
}

impl From<JsonRejection> for GatewayError {
    /// Map an extractor rejection onto the wire shape: 413 survives as-is
    /// (the body limit fired), everything else is a 400 validation failure.
    fn from(rejection: JsonRejection) -> Self {
        match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => Self::payload_too_large(rejection.body_text()),
            _ => Self::bad_request(rejection.body_text()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(error = %self.error, message = %self.message, "gateway error");
        } else {
            tracing::debug!(error = %self.error, message = %self.message, "gateway rejection");
        }

        (
            self.status,
            Json(ErrorBody {
                error: &self.error,
                message: &self.message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn error_body_is_error_and_message() {
        let response = GatewayError::unauthorized().into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn batch_too_large_names_both_sizes() {
        let err = GatewayError::batch_too_large(700, 500);
        assert!(err.message.contains("700"));
        assert!(err.message.contains("500"));
    }
}
