//! Pipeline Orchestrator
//!
//! Drives one upload through intake, extraction and rendering, then cleans
//! up. Stages run strictly in order for a single request:
//!
//! ```text
//! Validating -> Storing -> Extracting -> Rendering -> Cleaning -> Succeeded
//!                              \______________\_____-> Failing  -> Failed
//! ```
//!
//! The working tree is removed on every terminal path. A failed run also
//! removes the raw archive and any PDF, so nothing for that id remains
//! addressable. All deletion is keyed by the request's own artifact id.
//!
//! Once an upload is admitted the rest of the run is detached from the
//! request, so a client that disconnects mid-render still leaves the store
//! in a terminal state.

pub mod record;

use std::fmt;
use std::fmt::Display;
use std::path::PathBuf;
use std::time::Instant;

use axum::body::Bytes;
use chrono::Utc;
use futures::Stream;

use crate::archive::{ArchiveExtractor, ExtractError};
use crate::artifact::{ArtifactId, ArtifactStore, StoreError};
use crate::render::{RenderEngine, RenderError};
use crate::upload::{AdmittedUpload, Gatekeeper, UploadError};

pub use record::{resident_set_bytes, ConversionRecord, Outcome, RECORD_TARGET};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Validating,
    Storing,
    Extracting,
    Rendering,
    Cleaning,
    Succeeded,
    Failing,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::Storing => "storing",
            Self::Extracting => "extracting",
            Self::Rendering => "rendering",
            Self::Cleaning => "cleaning",
            Self::Succeeded => "succeeded",
            Self::Failing => "failing",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    #[error("Storing rendered document failed: {0}")]
    Store(#[from] StoreError),

    #[error("Conversion task failed: {0}")]
    Task(String),
}

/// Sequences gatekeeper, extractor and render engine for each request
#[derive(Clone)]
pub struct Pipeline {
    store: ArtifactStore,
    gatekeeper: Gatekeeper,
    extractor: ArchiveExtractor,
    engine: RenderEngine,
}

impl Pipeline {
    pub fn new(
        store: ArtifactStore,
        gatekeeper: Gatekeeper,
        extractor: ArchiveExtractor,
        engine: RenderEngine,
    ) -> Self {
        Self {
            store,
            gatekeeper,
            extractor,
            engine,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Admit an upload and convert it.
    ///
    /// Validation errors return before anything is stored.
    /// Dropping the returned future after admission does not stop the run.
    pub async fn convert<S, E>(
        &self,
        file_name: Option<&str>,
        content_type: Option<&str>,
        body: S,
    ) -> Result<ConversionRecord, PipelineError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let started = Instant::now();

        // The gatekeeper checks the type before storing anything
        tracing::debug!(stage = %PipelineStage::Validating, file_name = ?file_name, "Pipeline stage");
        let upload = self.gatekeeper.admit(file_name, content_type, body).await?;

        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.run(upload, started).await })
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?
    }

    /// Extract, render and clean up an already admitted upload
    pub async fn run(
        &self,
        upload: AdmittedUpload,
        started: Instant,
    ) -> Result<ConversionRecord, PipelineError> {
        let id = upload.artifact_id;
        let mut guard = DiscardGuard::new(self.store.clone(), id);

        match self.produce(&upload).await {
            Ok(pdf_path) => {
                guard.disarm();

                let record = self.record(&upload, started, Outcome::Succeeded);
                record.emit();

                self.enter(&id, PipelineStage::Cleaning);
                if let Err(e) = self.store.remove_working_tree(&id).await {
                    tracing::warn!(artifact_id = %id, "Failed to remove working tree: {}", e);
                }

                self.enter(&id, PipelineStage::Succeeded);
                tracing::debug!(artifact_id = %id, path = %pdf_path.display(), "PDF ready");
                Ok(record)
            }
            Err(error) => {
                self.enter(&id, PipelineStage::Failing);
                discard(&self.store, &id).await;
                guard.disarm();

                let record = self.record(
                    &upload,
                    started,
                    Outcome::Failed {
                        cause: error.to_string(),
                    },
                );
                record.emit();

                self.enter(&id, PipelineStage::Failed);
                Err(error)
            }
        }
    }

    async fn produce(&self, upload: &AdmittedUpload) -> Result<PathBuf, PipelineError> {
        let id = upload.artifact_id;

        self.enter(&id, PipelineStage::Extracting);
        self.extractor.extract(&id, &upload.raw_path).await?;

        self.enter(&id, PipelineStage::Rendering);
        let pdf = self
            .engine
            .render(&id, &self.store.entry_document(&id))
            .await?;

        Ok(self.store.write_pdf(&id, &pdf).await?)
    }

    fn record(&self, upload: &AdmittedUpload, started: Instant, outcome: Outcome) -> ConversionRecord {
        ConversionRecord {
            artifact_id: upload.artifact_id,
            file_name: upload.stored_name(),
            time_to_convert_ms: started.elapsed().as_millis() as u64,
            used_memory_bytes: resident_set_bytes(),
            archive_sha256: upload.sha256.clone(),
            outcome,
            finished_at: Utc::now(),
        }
    }

    fn enter(&self, id: &ArtifactId, stage: PipelineStage) {
        tracing::debug!(artifact_id = %id, stage = %stage, "Pipeline stage");
    }
}

/// Remove everything stored for a failed artifact
async fn discard(store: &ArtifactStore, id: &ArtifactId) {
    if let Err(e) = store.remove_working_tree(id).await {
        tracing::warn!(artifact_id = %id, "Failed to remove working tree: {}", e);
    }
    if let Err(e) = store.remove_raw_archives(id).await {
        tracing::warn!(artifact_id = %id, "Failed to remove raw archive: {}", e);
    }
    if let Err(e) = store.remove_pdf(id).await {
        tracing::warn!(artifact_id = %id, "Failed to remove PDF: {}", e);
    }
}

/// Discards an artifact if a run ends without reaching a terminal stage
struct DiscardGuard {
    store: ArtifactStore,
    id: ArtifactId,
    armed: bool,
}

impl DiscardGuard {
    fn new(store: ArtifactStore, id: ArtifactId) -> Self {
        Self {
            store,
            id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DiscardGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        tracing::warn!(artifact_id = %self.id, "Run interrupted, discarding artifact");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let store = self.store.clone();
            let id = self.id;
            handle.spawn(async move { discard(&store, &id).await });
        }
    }
}
