//! Failure taxonomy surfaced to HTTP callers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// A required input was absent or blank.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Store connectivity or write failure; the message is passed through.
    #[error("{0}")]
    Storage(String),

    /// Push provider failure; the provider's error object is passed through verbatim.
    #[error("delivery failed: {0}")]
    Delivery(Value),

    /// Store readiness check failed.
    #[error("{0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn storage(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }

    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(_) | Self::Delivery(_) | Self::Unavailable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            Self::Validation(message) | Self::NotFound(message) => json!({
                "success": false,
                "message": message,
            }),
            Self::Storage(error) => json!({
                "success": false,
                "error": error,
            }),
            Self::Delivery(error) => json!({
                "success": false,
                "error": error,
            }),
            Self::Unavailable(error) => json!({
                "success": false,
                "message": "Failed to connect to the store",
                "error": error,
            }),
        };

        (status, Json(body)).into_response()
    }
}
