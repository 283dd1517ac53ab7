//! Zip extraction into per-artifact working trees

mod extractor;

pub use extractor::{ArchiveExtractor, ExtractError, ExtractionSummary};
