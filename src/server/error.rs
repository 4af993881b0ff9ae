//! Request error taxonomy and its HTTP mapping.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Every way a request can fail.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Caller-supplied input failed validation. Not retryable as-is.
    #[error("{0}")]
    InvalidInput(String),

    /// Model not loaded. Retryable after a delay.
    #[error("model is not loaded")]
    ServiceUnavailable,

    /// Model invocation failed unexpectedly.
    #[error("embedding generation failed: {0}")]
    Internal(String),
}

/// JSON error body: `{"detail": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl ApiError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
