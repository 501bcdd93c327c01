// crates/kashi-server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use kashi_core::JobStatus;

/// Structured JSON error response for API errors.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// API error types that map to HTTP status codes.
///
/// Clients never see internals: a not-found and a not-owned job produce the
/// same 404, and 5xx bodies carry a generic message only.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Auth(String),

    #[error("not found")]
    NotFound,

    /// Result requested before the job finished; carries the current status.
    #[error("job not finished")]
    NotFinished(JobStatus),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, body) = match &self {
            ApiError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: message.clone(),
                    status: None,
                },
            ),
            ApiError::Auth(reason) => {
                tracing::debug!(reason = %reason, "request rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    ErrorResponse {
                        error: "unauthorized".to_string(),
                        status: None,
                    },
                )
            }
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: "not found".to_string(),
                    status: None,
                },
            ),
            ApiError::NotFinished(status) => (
                StatusCode::CONFLICT,
                ErrorResponse {
                    error: "job not finished".to_string(),
                    status: Some(status.to_string()),
                },
            ),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: "internal error".to_string(),
                        status: None,
                    },
                )
            }
        };
        (code, Json(body)).into_response()
    }
}
