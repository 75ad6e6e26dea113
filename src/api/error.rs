//! API error types rendered as `{ "error": message }` JSON bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::pipeline::encoder::EncodeError;

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Errors raised before a generation stream starts.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No files provided")]
    NoFiles,
    #[error("Invalid mode")]
    InvalidMode(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NoFiles => (StatusCode::BAD_REQUEST, "No files provided".to_string()),
            ApiError::InvalidMode(mode) => {
                tracing::debug!(mode, "Rejected unknown mode");
                (StatusCode::BAD_REQUEST, "Invalid mode".to_string())
            }
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail.clone()),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<EncodeError> for ApiError {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::Io(e) => ApiError::Internal(e.to_string()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}
