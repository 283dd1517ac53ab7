//! Render types

use std::path::PathBuf;

use serde::Serialize;

/// A4 paper in inches
pub const A4_WIDTH_IN: f64 = 8.27;
pub const A4_HEIGHT_IN: f64 = 11.69;

/// Fixed print settings applied to every document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderProfile {
    /// CSS media type to emulate before printing
    pub media: &'static str,
    pub paper_width_in: f64,
    pub paper_height_in: f64,
    pub landscape: bool,
    pub print_background: bool,
    pub display_header_footer: bool,
}

impl Default for RenderProfile {
    fn default() -> Self {
        Self {
            media: "screen",
            paper_width_in: A4_WIDTH_IN,
            paper_height_in: A4_HEIGHT_IN,
            landscape: true,
            print_background: true,
            display_header_footer: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Entry document not found: {0}")]
    MissingEntryDocument(PathBuf),

    #[error("Failed to launch browser: {0}")]
    BrowserLaunch(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Printing to PDF failed: {0}")]
    Print(String),

    #[error("Render timed out after {0} seconds")]
    Timeout(u64),

    #[error("Render engine unavailable")]
    Unavailable,

    #[error("Render task failed: {0}")]
    Join(String),
}
