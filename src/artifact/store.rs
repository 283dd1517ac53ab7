//! Artifact Store
//!
//! Local filesystem storage for the three artifact namespaces. Every
//! operation is keyed by a single [`ArtifactId`]; nothing here ever clears a
//! namespace root, so concurrent requests cannot delete each other's files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::id::ArtifactId;

/// Relative path of the document rendered from every extracted archive
pub const ENTRY_DOCUMENT: &str = "index.html";

const UPLOADS_DIR: &str = "uploads";
const ORIGINALS_DIR: &str = "output/originals";
const PDF_DIR: &str = "output/pdf";
const PARTIAL_SUFFIX: &str = ".pdf.part";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No rendered document for artifact {0}")]
    NotFound(String),

    #[error("Storage IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Filesystem-backed artifact storage
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the namespace roots if they are missing
    pub async fn ensure_layout(&self) -> Result<(), StoreError> {
        for dir in [self.uploads_dir(), self.originals_dir(), self.pdf_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| StoreError::io(&dir, e))?;
        }
        Ok(())
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join(UPLOADS_DIR)
    }

    pub fn originals_dir(&self) -> PathBuf {
        self.root.join(ORIGINALS_DIR)
    }

    pub fn pdf_dir(&self) -> PathBuf {
        self.root.join(PDF_DIR)
    }

    // ========================================================================
    // Paths
    // ========================================================================

    /// `uploads/{id}-{name}`; `name` must already be sanitized
    pub fn raw_archive_path(&self, id: &ArtifactId, name: &str) -> PathBuf {
        self.uploads_dir().join(format!("{}-{}", id, name))
    }

    pub fn working_dir(&self, id: &ArtifactId) -> PathBuf {
        self.originals_dir().join(id.to_string())
    }

    pub fn entry_document(&self, id: &ArtifactId) -> PathBuf {
        self.working_dir(id).join(ENTRY_DOCUMENT)
    }

    pub fn pdf_path(&self, id: &ArtifactId) -> PathBuf {
        self.pdf_dir().join(format!("{}.pdf", id))
    }

    fn partial_pdf_path(&self, id: &ArtifactId) -> PathBuf {
        self.pdf_dir().join(format!("{}{}", id, PARTIAL_SUFFIX))
    }

    // ========================================================================
    // Rendered documents
    // ========================================================================

    /// Persist a rendered PDF.
    ///
    /// Bytes go to a sibling temp file first and are renamed into place, so
    /// `read_pdf` never observes a half-written document.
    pub async fn write_pdf(&self, id: &ArtifactId, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let partial = self.partial_pdf_path(id);
        let target = self.pdf_path(id);

        if let Err(e) = tokio::fs::write(&partial, bytes).await {
            let _ = remove_file_if_exists(&partial).await;
            return Err(StoreError::io(&partial, e));
        }

        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            let _ = remove_file_if_exists(&partial).await;
            return Err(StoreError::io(&target, e));
        }

        Ok(target)
    }

    /// Read a rendered PDF, `NotFound` if none exists for this id
    pub async fn read_pdf(&self, id: &ArtifactId) -> Result<Vec<u8>, StoreError> {
        let path = self.pdf_path(id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(id.to_string())),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Open a rendered PDF for streaming, with its length
    pub async fn open_pdf(&self, id: &ArtifactId) -> Result<(tokio::fs::File, u64), StoreError> {
        let path = self.pdf_path(id);
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };
        let len = file
            .metadata()
            .await
            .map_err(|e| StoreError::io(&path, e))?
            .len();
        Ok((file, len))
    }

    pub async fn pdf_exists(&self, id: &ArtifactId) -> bool {
        tokio::fs::try_exists(self.pdf_path(id)).await.unwrap_or(false)
    }

    // ========================================================================
    // Deletion (per id only)
    // ========================================================================

    /// Remove the extracted tree for one artifact
    pub async fn remove_working_tree(&self, id: &ArtifactId) -> Result<bool, StoreError> {
        let dir = self.working_dir(id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(dir, e)),
        }
    }

    /// Remove every raw archive stored for one artifact (`uploads/{id}-*`)
    pub async fn remove_raw_archives(&self, id: &ArtifactId) -> Result<usize, StoreError> {
        let dir = self.uploads_dir();
        let prefix = format!("{}-", id);

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StoreError::io(dir, e)),
        };

        let mut count = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&dir, e))?
        {
            if !entry.file_name().to_string_lossy().starts_with(&prefix) {
                continue;
            }
            if remove_file_if_exists(&entry.path()).await? {
                count += 1;
            }
        }

        Ok(count)
    }

    /// Remove a rendered PDF and any leftover partial write
    pub async fn remove_pdf(&self, id: &ArtifactId) -> Result<bool, StoreError> {
        remove_file_if_exists(&self.partial_pdf_path(id)).await?;
        remove_file_if_exists(&self.pdf_path(id)).await
    }
}

async fn remove_file_if_exists(path: &Path) -> Result<bool, StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io(path, e)),
    }
}
