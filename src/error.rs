//! Error types for the zip2pdf server
//!
//! Clients of `/upload` only ever see one failure status with a short
//! message; the full cause is logged here or in the conversion record.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::artifact::StoreError;
use crate::pipeline::PipelineError;
use crate::upload::UploadError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Status returned for every failed upload
pub const UPLOAD_FAILURE_STATUS: StatusCode = StatusCode::UNSUPPORTED_MEDIA_TYPE;

/// Message returned when extraction or rendering failed
pub const CONVERSION_FAILED_MESSAGE: &str =
    "conversion failed: expected index.html in the archive root";

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        AppError::Pipeline(PipelineError::Upload(err))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AppError::NotFound(id),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Pipeline(PipelineError::Upload(e)) => {
                tracing::warn!("Upload rejected: {}", e);
                (UPLOAD_FAILURE_STATUS, e.public_message().to_string())
            }
            // Cause already logged with the conversion record
            AppError::Pipeline(_) => (UPLOAD_FAILURE_STATUS, CONVERSION_FAILED_MESSAGE.to_string()),
            AppError::NotFound(what) => {
                tracing::debug!("Not found: {}", what);
                (StatusCode::NOT_FOUND, "not found".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
