//! Artifact identity and filesystem-backed storage
//!
//! Every upload is tracked by one [`ArtifactId`] across three namespaces:
//! - `uploads/{id}-{name}`: the raw archive as received
//! - `output/originals/{id}/`: the extracted working tree
//! - `output/pdf/{id}.pdf`: the rendered document

mod id;
mod store;

pub use id::ArtifactId;
pub use store::{ArtifactStore, StoreError, ENTRY_DOCUMENT};
