//! Archive Extractor
//!
//! Decompresses a stored zip into the artifact's working directory.
//! Decompression runs on the blocking pool and `extract` only resolves once
//! every entry has been written, so callers can rely on the tree being
//! complete when it returns.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::Serialize;
use zip::ZipArchive;

use crate::artifact::{ArtifactId, ArtifactStore};
use crate::config::UploadConfig;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    #[error("Archive entry escapes the extraction directory: {0}")]
    UnsafeEntry(String),

    #[error("Archive has {count} entries (max: {max})")]
    TooManyEntries { count: usize, max: usize },

    #[error("Archive expands to more than {max} bytes")]
    TooLarge { max: u64 },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Extraction task failed: {0}")]
    Join(String),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExtractError + '_ {
    move |source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// What an extraction produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy)]
struct ExtractLimits {
    max_bytes: u64,
    max_entries: usize,
}

/// Extracts raw archives into per-artifact working trees
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    store: ArtifactStore,
    limits: ExtractLimits,
}

impl ArchiveExtractor {
    pub fn new(store: ArtifactStore, config: &UploadConfig) -> Self {
        Self {
            store,
            limits: ExtractLimits {
                max_bytes: config.max_extracted_bytes,
                max_entries: config.max_archive_entries,
            },
        }
    }

    /// Extract `raw_path` into `output/originals/{id}/` and wait for it to finish
    pub async fn extract(
        &self,
        id: &ArtifactId,
        raw_path: &Path,
    ) -> Result<ExtractionSummary, ExtractError> {
        let source = raw_path.to_path_buf();
        let dest = self.store.working_dir(id);
        let limits = self.limits;

        let summary = tokio::task::spawn_blocking(move || extract_zip(&source, &dest, limits))
            .await
            .map_err(|e| ExtractError::Join(e.to_string()))??;

        tracing::debug!(
            artifact_id = %id,
            files = summary.files,
            directories = summary.directories,
            bytes = summary.bytes,
            "Archive extracted"
        );

        Ok(summary)
    }
}

fn extract_zip(
    source: &Path,
    dest: &Path,
    limits: ExtractLimits,
) -> Result<ExtractionSummary, ExtractError> {
    let file = File::open(source).map_err(io_error(source))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| ExtractError::InvalidArchive(e.to_string()))?;

    if archive.len() > limits.max_entries {
        return Err(ExtractError::TooManyEntries {
            count: archive.len(),
            max: limits.max_entries,
        });
    }

    std::fs::create_dir_all(dest).map_err(io_error(dest))?;

    let mut summary = ExtractionSummary::default();

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| ExtractError::InvalidArchive(e.to_string()))?;

        // Rejects absolute paths and anything climbing out with `..`
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| ExtractError::UnsafeEntry(entry.name().to_string()))?;
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(io_error(&out_path))?;
            summary.directories += 1;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        let remaining = limits.max_bytes.saturating_sub(summary.bytes);
        let mut out = File::create(&out_path).map_err(io_error(&out_path))?;
        let copied = std::io::copy(&mut (&mut entry).take(remaining.saturating_add(1)), &mut out)
            .map_err(io_error(&out_path))?;

        if copied > remaining {
            return Err(ExtractError::TooLarge {
                max: limits.max_bytes,
            });
        }

        summary.bytes += copied;
        summary.files += 1;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::fixtures::zip_bytes;
    use tempfile::TempDir;

    async fn setup(max_bytes: u64, max_entries: usize) -> (TempDir, ArtifactStore, ArchiveExtractor) {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path());
        store.ensure_layout().await.unwrap();
        let config = UploadConfig {
            max_upload_bytes: 1024 * 1024,
            accepted_mime_type: "application/x-zip-compressed".to_string(),
            max_extracted_bytes: max_bytes,
            max_archive_entries: max_entries,
        };
        let extractor = ArchiveExtractor::new(store.clone(), &config);
        (temp_dir, store, extractor)
    }

    async fn stage(store: &ArtifactStore, id: &ArtifactId, bytes: Vec<u8>) -> PathBuf {
        let path = store.raw_archive_path(id, "site.zip");
        tokio::fs::write(&path, bytes).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_extracts_nested_tree() {
        let (_dir, store, extractor) = setup(1024 * 1024, 100).await;
        let id = ArtifactId::new();
        let raw = stage(
            &store,
            &id,
            zip_bytes(&[
                ("index.html", "<h1>hi</h1>"),
                ("css/", ""),
                ("css/site.css", "h1 { color: red }"),
            ]),
        )
        .await;

        let summary = extractor.extract(&id, &raw).await.unwrap();

        assert_eq!(summary.files, 2);
        assert_eq!(summary.directories, 1);
        assert_eq!(
            std::fs::read_to_string(store.entry_document(&id)).unwrap(),
            "<h1>hi</h1>"
        );
        assert!(store.working_dir(&id).join("css/site.css").is_file());
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let (dir, store, extractor) = setup(1024 * 1024, 100).await;
        let id = ArtifactId::new();
        let raw = stage(&store, &id, zip_bytes(&[("../../escaped.txt", "gotcha")])).await;

        let result = extractor.extract(&id, &raw).await;

        assert!(matches!(result, Err(ExtractError::UnsafeEntry(_))));
        assert!(!dir.path().join("escaped.txt").exists());
        assert!(!dir.path().join("output/escaped.txt").exists());
    }

    #[tokio::test]
    async fn test_rejects_expansion_over_limit() {
        let (_dir, store, extractor) = setup(16, 100).await;
        let id = ArtifactId::new();
        let big = "x".repeat(64);
        let raw = stage(&store, &id, zip_bytes(&[("index.html", big.as_str())])).await;

        let result = extractor.extract(&id, &raw).await;

        assert!(matches!(result, Err(ExtractError::TooLarge { max: 16 })));
    }

    #[tokio::test]
    async fn test_unbounded_limit_extracts_contents() {
        let (_dir, store, extractor) = setup(u64::MAX, 100).await;
        let id = ArtifactId::new();
        let raw = stage(&store, &id, zip_bytes(&[("index.html", "<h1>all of it</h1>")])).await;

        let summary = extractor.extract(&id, &raw).await.unwrap();

        assert_eq!(summary.bytes, "<h1>all of it</h1>".len() as u64);
        assert_eq!(
            std::fs::read_to_string(store.entry_document(&id)).unwrap(),
            "<h1>all of it</h1>"
        );
    }

    #[tokio::test]
    async fn test_rejects_too_many_entries() {
        let (_dir, store, extractor) = setup(1024, 2).await;
        let id = ArtifactId::new();
        let raw = stage(
            &store,
            &id,
            zip_bytes(&[("a.html", "a"), ("b.html", "b"), ("c.html", "c")]),
        )
        .await;

        let result = extractor.extract(&id, &raw).await;

        assert!(matches!(
            result,
            Err(ExtractError::TooManyEntries { count: 3, max: 2 })
        ));
    }

    #[tokio::test]
    async fn test_rejects_non_zip() {
        let (_dir, store, extractor) = setup(1024, 10).await;
        let id = ArtifactId::new();
        let raw = stage(&store, &id, b"definitely not a zip".to_vec()).await;

        let result = extractor.extract(&id, &raw).await;

        assert!(matches!(result, Err(ExtractError::InvalidArchive(_))));
    }
}
