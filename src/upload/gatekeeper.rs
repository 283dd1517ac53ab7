//! Ingress Gatekeeper
//!
//! Validates an incoming archive and writes it to the raw namespace. The
//! declared type is checked before a single byte is written; the size is
//! enforced while streaming. A partial file is deleted whenever admission
//! does not complete, whether it failed or the request was dropped.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use super::types::{AdmittedUpload, UploadError, FALLBACK_FILE_NAME};
use crate::artifact::{ArtifactId, ArtifactStore};
use crate::config::UploadConfig;

/// Admits archives into the artifact store
#[derive(Debug, Clone)]
pub struct Gatekeeper {
    store: ArtifactStore,
    accepted_mime_type: String,
    max_upload_bytes: u64,
}

impl Gatekeeper {
    pub fn new(store: ArtifactStore, config: &UploadConfig) -> Self {
        Self {
            store,
            accepted_mime_type: config.accepted_mime_type.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    /// Reject anything but the one accepted archive type
    pub fn check_type(&self, content_type: Option<&str>) -> Result<(), UploadError> {
        let actual = content_type.unwrap_or("");
        if actual != self.accepted_mime_type {
            tracing::warn!(
                expected = %self.accepted_mime_type,
                actual = %actual,
                "Rejected upload with unexpected content type"
            );
            return Err(UploadError::BadFileType {
                expected: self.accepted_mime_type.clone(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }

    /// Validate and persist one upload.
    ///
    /// On success the raw archive exists at `uploads/{id}-{name}`. On any
    /// error nothing keyed by the minted id is left on disk.
    pub async fn admit<S, E>(
        &self,
        file_name: Option<&str>,
        content_type: Option<&str>,
        body: S,
    ) -> Result<AdmittedUpload, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        self.check_type(content_type)?;

        let artifact_id = ArtifactId::new();
        let original_name = sanitize_file_name(file_name.unwrap_or(FALLBACK_FILE_NAME));
        let raw_path = self.store.raw_archive_path(&artifact_id, &original_name);

        let mut partial = PartialUpload::new(raw_path.clone());
        let (size, sha256) = self.persist(&raw_path, body).await?;
        partial.disarm();

        tracing::info!(
            artifact_id = %artifact_id,
            file_name = %original_name,
            size = size,
            "Upload admitted"
        );

        Ok(AdmittedUpload {
            artifact_id,
            original_name,
            raw_path,
            size,
            sha256,
        })
    }

    async fn persist<S, E>(
        &self,
        path: &Path,
        body: S,
    ) -> Result<(u64, String), UploadError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let mut body = std::pin::pin!(body);
        let mut file = tokio::fs::File::create(path).await?;
        let mut hasher = Sha256::new();
        let mut written: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| UploadError::Multipart(e.to_string()))?;

            written += chunk.len() as u64;
            if written > self.max_upload_bytes {
                tracing::warn!(max = self.max_upload_bytes, "Upload exceeded size limit");
                return Err(UploadError::FileTooLarge {
                    max: self.max_upload_bytes,
                });
            }

            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        Ok((written, hex::encode(hasher.finalize())))
    }
}

/// Deletes a raw upload unless admission completed
struct PartialUpload {
    path: PathBuf,
    armed: bool,
}

impl PartialUpload {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartialUpload {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), "Failed to remove rejected upload: {}", e);
            }
        }
    }
}

/// Reduce a client-supplied name to one safe path component
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        trimmed.chars().take(128).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ZIP: &str = "application/x-zip-compressed";

    async fn test_gatekeeper(max: u64) -> (TempDir, Gatekeeper, ArtifactStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path());
        store.ensure_layout().await.unwrap();
        let config = UploadConfig {
            max_upload_bytes: max,
            accepted_mime_type: ZIP.to_string(),
            max_extracted_bytes: 1024 * 1024,
            max_archive_entries: 100,
        };
        let gatekeeper = Gatekeeper::new(store.clone(), &config);
        (temp_dir, gatekeeper, store)
    }

    fn body(chunks: &[&'static str]) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        let chunks: Vec<_> = chunks
            .iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect();
        futures::stream::iter(chunks)
    }

    fn uploads(store: &ArtifactStore) -> usize {
        std::fs::read_dir(store.uploads_dir()).unwrap().count()
    }

    #[tokio::test]
    async fn test_admit_writes_raw_archive() {
        let (_dir, gatekeeper, store) = test_gatekeeper(1024).await;

        let admitted = gatekeeper
            .admit(Some("site.zip"), Some(ZIP), body(&["PK", "\x03\x04"]))
            .await
            .unwrap();

        assert_eq!(admitted.size, 4);
        assert_eq!(admitted.original_name, "site.zip");
        assert_eq!(admitted.sha256.len(), 64);
        assert_eq!(
            admitted.raw_path,
            store.raw_archive_path(&admitted.artifact_id, "site.zip")
        );
        assert_eq!(std::fs::read(&admitted.raw_path).unwrap(), b"PK\x03\x04");
        assert!(admitted
            .raw_path
            .ends_with(admitted.stored_name()));
    }

    #[tokio::test]
    async fn test_wrong_type_writes_nothing() {
        let (_dir, gatekeeper, store) = test_gatekeeper(1024).await;

        let result = gatekeeper
            .admit(Some("site.zip"), Some("application/pdf"), body(&["PK"]))
            .await;

        assert!(matches!(result, Err(UploadError::BadFileType { .. })));
        assert_eq!(uploads(&store), 0);
    }

    #[tokio::test]
    async fn test_missing_type_is_bad_file_type() {
        let (_dir, gatekeeper, _store) = test_gatekeeper(1024).await;
        let result = gatekeeper.admit(Some("site.zip"), None, body(&["PK"])).await;
        assert!(matches!(result, Err(UploadError::BadFileType { .. })));
    }

    #[tokio::test]
    async fn test_exact_limit_is_accepted() {
        let (_dir, gatekeeper, _store) = test_gatekeeper(8).await;

        let admitted = gatekeeper
            .admit(Some("a.zip"), Some(ZIP), body(&["1234", "5678"]))
            .await
            .unwrap();

        assert_eq!(admitted.size, 8);
    }

    #[tokio::test]
    async fn test_one_byte_over_limit_is_rejected_and_removed() {
        let (_dir, gatekeeper, store) = test_gatekeeper(8).await;

        let result = gatekeeper
            .admit(Some("a.zip"), Some(ZIP), body(&["1234", "56789"]))
            .await;

        assert!(matches!(result, Err(UploadError::FileTooLarge { max: 8 })));
        assert_eq!(uploads(&store), 0);
    }

    #[tokio::test]
    async fn test_stream_error_removes_partial_file() {
        let (_dir, gatekeeper, store) = test_gatekeeper(1024).await;

        let failing = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"PK")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);

        let result = gatekeeper.admit(Some("a.zip"), Some(ZIP), failing).await;

        assert!(matches!(result, Err(UploadError::Multipart(_))));
        assert_eq!(uploads(&store), 0);
    }

    #[tokio::test]
    async fn test_dropped_upload_removes_partial_file() {
        let (_dir, gatekeeper, store) = test_gatekeeper(1024).await;

        let stalled = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"PK"))])
            .chain(futures::stream::pending());

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            gatekeeper.admit(Some("a.zip"), Some(ZIP), stalled),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(uploads(&store), 0);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("site.zip"), "site.zip");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\my site.zip"), "my_site.zip");
        assert_eq!(sanitize_file_name("..."), FALLBACK_FILE_NAME);
        assert_eq!(sanitize_file_name(""), FALLBACK_FILE_NAME);
    }
}
