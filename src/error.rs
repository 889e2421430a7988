use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::storage::StorageError;

/// Failures a handler cannot turn into a page or login outcome.
///
/// Serialized as `{"code": "...", "message": "..."}`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed request body. HTTP 400.
    #[error("{0}")]
    BadRequest(String),

    /// Photo bucket unreachable or refusing writes. HTTP 500.
    #[error("{0}")]
    Storage(String),

    /// Database or other unexpected failure. HTTP 500.
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        if e.downcast_ref::<StorageError>().is_some() {
            AppError::Storage(format!("{:#}", e))
        } else {
            AppError::Internal(format!("{:#}", e))
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.error_code(), error = %self, "request failed");
        }
        let body = serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
