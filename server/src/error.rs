use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use clone_core::CloneError;
use serde::Serialize;
use thiserror::Error;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Synthesis error: {0}")]
    SynthesisError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl ApiError {
    /// Multipart read failures are the client's fault, except an upload
    /// over the body limit, which keeps its 413.
    pub fn from_multipart(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(e.body_text())
        } else {
            ApiError::InvalidInput(format!("Invalid multipart body: {}", e.body_text()))
        }
    }
}

impl From<CloneError> for ApiError {
    fn from(e: CloneError) -> Self {
        match e {
            CloneError::NoSample(_) => {
                ApiError::NotFound("No voice recorded for this user_id".to_string())
            }
            CloneError::Synthesis(e) => {
                ApiError::SynthesisError(format!("Voice cloning process failed: {e:#}"))
            }
            CloneError::TimedOut(_) => {
                ApiError::SynthesisError(format!("Voice cloning process failed: {e}"))
            }
            CloneError::Io(e) => {
                tracing::error!("Storage error during voice cloning: {}", e);
                ApiError::InternalError(
                    "An unexpected error occurred during voice cloning.".to_string(),
                )
            }
        }
    }
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            ApiError::SynthesisError(msg) => {
                tracing::error!("Synthesis error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}
