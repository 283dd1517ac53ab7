//! Upload route
//!
//! `POST /upload` takes a multipart form with one `file` field holding a
//! zipped site, converts it, and redirects to the download URL.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    response::Redirect,
    routing::post,
    Router,
};

use crate::error::Result;
use crate::state::AppState;
use crate::upload::{UploadError, FILE_FIELD};

/// Create the upload router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        // The gatekeeper enforces the configured limit while streaming
        .layer(DefaultBodyLimit::disable())
}

/// POST /upload
async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Result<Redirect> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::Multipart(e.to_string()))?
    {
        if field.name() != Some(FILE_FIELD) {
            tracing::debug!(name = ?field.name(), "Skipping multipart field");
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        let record = state
            .pipeline()
            .convert(file_name.as_deref(), content_type.as_deref(), field)
            .await?;

        return Ok(Redirect::to(&download_path(&record.artifact_id)));
    }

    tracing::warn!("No file field found in multipart upload");
    Err(UploadError::MissingFile.into())
}

pub fn download_path(id: &crate::artifact::ArtifactId) -> String {
    format!("/convert/{}", id)
}
