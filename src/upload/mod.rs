//! Upload intake
//!
//! Validates the declared type and size of an uploaded archive, mints its
//! artifact id and writes the raw bytes to the store. No extraction happens
//! here.

pub mod gatekeeper;
pub mod types;

pub use gatekeeper::{sanitize_file_name, Gatekeeper};
pub use types::*;
