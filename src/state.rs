//! Application state management

use std::sync::Arc;

use crate::archive::ArchiveExtractor;
use crate::artifact::{ArtifactStore, StoreError};
use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::render::{PdfRenderer, RenderEngine};
use crate::upload::Gatekeeper;

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to prepare artifact storage: {0}")]
    Storage(#[from] StoreError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    pipeline: Pipeline,
}

impl AppState {
    /// Create state rendering with headless Chrome
    pub async fn new(config: Config) -> Result<Self, StateError> {
        let engine = RenderEngine::chrome(&config.render);
        Self::with_engine(config, engine).await
    }

    /// Create state with a custom renderer backend
    pub async fn with_renderer(
        config: Config,
        renderer: Arc<dyn PdfRenderer>,
    ) -> Result<Self, StateError> {
        let engine = RenderEngine::new(renderer, &config.render);
        Self::with_engine(config, engine).await
    }

    async fn with_engine(config: Config, engine: RenderEngine) -> Result<Self, StateError> {
        let store = ArtifactStore::new(&config.storage.data_dir);
        store.ensure_layout().await?;

        let pipeline = Pipeline::new(
            store.clone(),
            Gatekeeper::new(store.clone(), &config.upload),
            ArchiveExtractor::new(store, &config.upload),
            engine,
        );

        Ok(Self {
            inner: Arc::new(AppStateInner { config, pipeline }),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the conversion pipeline
    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    /// Get the artifact store
    pub fn store(&self) -> &ArtifactStore {
        self.inner.pipeline.store()
    }
}
