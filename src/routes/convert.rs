//! Download route
//!
//! `GET /convert/:id` returns the rendered PDF for an artifact.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Router,
};

use tokio_util::io::ReaderStream;

use crate::artifact::ArtifactId;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Create the download router
pub fn router() -> Router<AppState> {
    Router::new().route("/convert/:id", get(download))
}

/// Stream a rendered PDF as an attachment
async fn download(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    // Anything that is not an artifact id cannot name a stored file
    let artifact_id: ArtifactId = id.parse().map_err(|_| AppError::NotFound(id.clone()))?;

    let (file, size) = state.store().open_pdf(&artifact_id).await?;

    tracing::debug!(artifact_id = %artifact_id, size = size, "Serving PDF");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_LENGTH, size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.pdf\"", artifact_id),
        )
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::Internal(e.to_string()))
}
