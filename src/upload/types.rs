//! Upload types

use std::path::PathBuf;

use serde::Serialize;

use crate::artifact::ArtifactId;

/// Multipart field carrying the archive
pub const FILE_FIELD: &str = "file";

/// Name used when the client sends none, or one that sanitizes to nothing
pub const FALLBACK_FILE_NAME: &str = "archive.zip";

/// An upload that passed validation and was written to the raw namespace
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmittedUpload {
    /// Freshly minted id for this upload
    pub artifact_id: ArtifactId,

    /// Client file name reduced to a safe single path component
    pub original_name: String,

    /// Where the raw archive was written
    pub raw_path: PathBuf,

    /// Bytes received
    pub size: u64,

    /// Hex SHA-256 of the archive bytes
    pub sha256: String,
}

impl AdmittedUpload {
    /// Stored file name, `{id}-{original_name}`
    pub fn stored_name(&self) -> String {
        format!("{}-{}", self.artifact_id, self.original_name)
    }
}

/// Errors raised while admitting an upload
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("bad file type: expected {expected}, got {actual}")]
    BadFileType { expected: String, actual: String },

    #[error("file too large: more than {max} bytes")]
    FileTooLarge { max: u64 },

    #[error("no file provided in field 'file'")]
    MissingFile,

    #[error("failed to read upload body: {0}")]
    Multipart(String),

    #[error("failed to persist upload: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Message shown to clients
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::BadFileType { .. } => "bad file type",
            Self::FileTooLarge { .. } => "file too large",
            Self::MissingFile => "no file provided",
            Self::Multipart(_) => "failed to read upload",
            Self::Io(_) => "failed to store upload",
        }
    }
}
