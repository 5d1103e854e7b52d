//! Error handling for the catalog HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Standard error response format for all HTTP errors.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: String,
    pub trace_id: String,
    pub timestamp: String,
}

/// Application error types that map to HTTP responses.
///
/// The taxonomy is deliberately small: a missing record, a malformed
/// request, a rejected credential, and everything else. Upstream failures
/// are not retried or discriminated; their description is surfaced in the
/// 500 body.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {message}")]
    NotFound { message: String, code: String },

    #[error("bad request: {message}")]
    BadRequest { message: String, code: String },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String, code: String },

    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl AppError {
    /// Create a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            code: "not_found".to_string(),
        }
    }

    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            code: "bad_request".to_string(),
        }
    }

    /// Create an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
            code: "unauthorized".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_id = Uuid::new_v4();
        let timestamp = OffsetDateTime::now_utc().to_string();

        let (status, error_code, message) = match self {
            AppError::NotFound { message, code } => (StatusCode::NOT_FOUND, code, message),
            AppError::BadRequest { message, code } => (StatusCode::BAD_REQUEST, code, message),
            AppError::Unauthorized { message, code } => {
                (StatusCode::UNAUTHORIZED, code, message)
            }
            // The raw upstream description goes to the caller; nothing here
            // is retried or circuit-broken.
            AppError::Upstream(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "upstream_error".to_string(),
                e.to_string(),
            ),
        };

        let body = ErrorBody {
            message,
            code: error_code,
            trace_id: error_id.to_string(),
            timestamp,
        };

        tracing::error!(
            error_id = %body.trace_id,
            error_code = %body.code,
            status_code = %status.as_u16(),
            "Request error"
        );

        (status, Json(json!({ "error": body }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn not_found_maps_to_404() {
        let error = AppError::not_found("book b-1 not found");
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn bad_request_maps_to_400() {
        let error = AppError::bad_request("filename is required");
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unauthorized_maps_to_401() {
        let error = AppError::unauthorized("missing api key");
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn upstream_maps_to_500() {
        let upstream = anyhow::anyhow!("document store connection refused");
        let error = AppError::Upstream(upstream);
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn response_body_carries_the_error_envelope() {
        let response = AppError::not_found("book b-9 not found").into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["error"]["code"], "not_found");
        assert_eq!(body["error"]["message"], "book b-9 not found");
        assert!(body["error"]["trace_id"].as_str().is_some_and(|t| !t.is_empty()));
        assert!(body["error"]["timestamp"].as_str().is_some_and(|t| !t.is_empty()));
    }

    #[test]
    fn bad_request_carries_its_code() {
        match AppError::bad_request("missing field") {
            AppError::BadRequest { code, message } => {
                assert_eq!(code, "bad_request");
                assert_eq!(message, "missing field");
            }
            _ => panic!("expected BadRequest"),
        }
    }
}
