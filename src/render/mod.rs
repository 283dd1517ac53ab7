//! Render Engine
//!
//! Turns an extracted entry document into PDF bytes. The engine gates
//! renderers behind a semaphore, so only a bounded number of browser
//! processes exist at once, and bounds every render with a timeout.

pub mod chrome;
pub mod types;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::artifact::ArtifactId;
use crate::config::RenderConfig;

pub use chrome::ChromeRenderer;
pub use types::{RenderError, RenderProfile, A4_HEIGHT_IN, A4_WIDTH_IN};

/// Admission ticket for one render.
///
/// Holding it counts against the concurrent render cap. A renderer that
/// hands work to another thread moves the slot along with it, so the slot is
/// only released once that work has actually ended.
#[derive(Debug)]
pub struct RenderSlot {
    _permit: OwnedSemaphorePermit,
}

/// Backend that prints one local HTML file to PDF
#[async_trait::async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(
        &self,
        entry: &Path,
        profile: &RenderProfile,
        slot: RenderSlot,
    ) -> Result<Vec<u8>, RenderError>;
}

/// Admission-controlled front for a [`PdfRenderer`]
#[derive(Clone)]
pub struct RenderEngine {
    renderer: Arc<dyn PdfRenderer>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    profile: RenderProfile,
}

impl RenderEngine {
    pub fn new(renderer: Arc<dyn PdfRenderer>, config: &RenderConfig) -> Self {
        Self {
            renderer,
            permits: Arc::new(Semaphore::new(config.max_concurrent_renders.max(1))),
            timeout: config.timeout(),
            profile: RenderProfile::default(),
        }
    }

    /// Engine backed by headless Chrome
    pub fn chrome(config: &RenderConfig) -> Self {
        Self::new(Arc::new(ChromeRenderer::new(config)), config)
    }

    pub fn profile(&self) -> &RenderProfile {
        &self.profile
    }

    /// Renders currently admitted
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Render the entry document of one artifact
    pub async fn render(&self, id: &ArtifactId, entry: &Path) -> Result<Vec<u8>, RenderError> {
        if !tokio::fs::try_exists(entry).await.unwrap_or(false) {
            return Err(RenderError::MissingEntryDocument(entry.to_path_buf()));
        }

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RenderError::Unavailable)?;
        let slot = RenderSlot { _permit: permit };

        tracing::debug!(artifact_id = %id, "Render admitted");

        // Dropping the renderer future on timeout is what abandons the render
        match timeout(self.timeout, self.renderer.render(entry, &self.profile, slot)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    artifact_id = %id,
                    timeout_secs = self.timeout.as_secs(),
                    "Render timed out"
                );
                Err(RenderError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}
