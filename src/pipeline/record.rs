//! Conversion records
//!
//! One record per finished pipeline run, emitted as a `tracing` event on the
//! `conversion` target so a subscriber can route it to its own sink.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::artifact::ArtifactId;

pub const RECORD_TARGET: &str = "conversion";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Succeeded,
    Failed { cause: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRecord {
    pub artifact_id: ArtifactId,
    /// Stored archive name, `{id}-{original}`
    pub file_name: String,
    pub time_to_convert_ms: u64,
    /// Resident set size when the record was taken
    pub used_memory_bytes: Option<u64>,
    pub archive_sha256: String,
    pub outcome: Outcome,
    pub finished_at: DateTime<Utc>,
}

impl ConversionRecord {
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }

    pub fn emit(&self) {
        let used_memory = self
            .used_memory_bytes
            .map(format_megabytes)
            .unwrap_or_else(|| "unknown".to_string());

        match &self.outcome {
            Outcome::Succeeded => tracing::info!(
                target: RECORD_TARGET,
                artifact_id = %self.artifact_id,
                file_name = %self.file_name,
                time_to_convert_ms = self.time_to_convert_ms,
                used_memory_bytes = self.used_memory_bytes,
                used_memory = %used_memory,
                archive_sha256 = %self.archive_sha256,
                outcome = "succeeded",
                "Conversion finished"
            ),
            Outcome::Failed { cause } => tracing::error!(
                target: RECORD_TARGET,
                artifact_id = %self.artifact_id,
                file_name = %self.file_name,
                time_to_convert_ms = self.time_to_convert_ms,
                used_memory_bytes = self.used_memory_bytes,
                used_memory = %used_memory,
                archive_sha256 = %self.archive_sha256,
                outcome = "failed",
                cause = %cause,
                "Conversion failed"
            ),
        }
    }
}

/// Current resident set size of this process, from procfs
pub fn resident_set_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kib: u64 = line
        .trim_start_matches("VmRSS:")
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    Some(kib * 1024)
}

pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}
