//! Errors surfaced to HTTP callers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Request-level failures.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The endpoint needs an explicit identity and none was supplied.
    #[error("User ID is required. Provide it via the X-User-ID header, the userId query parameter, or a userId body field")]
    MissingIdentity,

    /// Anything unexpected. The detail is logged, never returned.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON body for an error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Short classification
    pub error: &'static str,
    /// Human-readable explanation
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::MissingIdentity => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: "Bad Request",
                    message: self.to_string(),
                },
            ),
            ApiError::Internal(detail) => {
                error!(error = %detail, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: "Internal Server Error",
                        message: "An unexpected error occurred".to_string(),
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::MissingIdentity.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal("boom".to_string()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_internal_detail_not_leaked() {
        let response = ApiError::Internal("secret detail".to_string()).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("secret detail"));
        assert!(text.contains("An unexpected error occurred"));
    }
}
