//! Configuration management for zip2pdf-server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while reading configuration from the environment
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a number, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Auxiliary static pages served at `/`
    pub public_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root under which `uploads/` and `output/` live
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub max_upload_bytes: u64,
    pub accepted_mime_type: String,
    pub max_extracted_bytes: u64,
    pub max_archive_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    pub max_concurrent_renders: usize,
    pub timeout_secs: u64,
    pub chrome_path: Option<PathBuf>,
}

impl RenderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 2 GB, decimal, as the upload limit has always been advertised
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 2 * 1000 * 1_000_000;
pub const DEFAULT_ACCEPTED_MIME_TYPE: &str = "application/x-zip-compressed";
pub const DEFAULT_MAX_EXTRACTED_BYTES: u64 = 8 * 1024 * 1024 * 1024;
pub const DEFAULT_MAX_ARCHIVE_ENTRIES: usize = 10_000;
pub const DEFAULT_PORT: u16 = 5000;

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: DEFAULT_PORT,
                public_dir: PathBuf::from("public"),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("."),
            },
            upload: UploadConfig {
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
                accepted_mime_type: DEFAULT_ACCEPTED_MIME_TYPE.to_string(),
                max_extracted_bytes: DEFAULT_MAX_EXTRACTED_BYTES,
                max_archive_entries: DEFAULT_MAX_ARCHIVE_ENTRIES,
            },
            render: RenderConfig {
                max_concurrent_renders: 4,
                timeout_secs: 60,
                chrome_path: None,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port)?,
                public_dir: env::var("PUBLIC_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.server.public_dir),
            },
            storage: StorageConfig {
                data_dir: env::var("DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.data_dir),
            },
            upload: UploadConfig {
                max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", defaults.upload.max_upload_bytes)?,
                accepted_mime_type: env::var("ACCEPTED_MIME_TYPE")
                    .unwrap_or(defaults.upload.accepted_mime_type),
                max_extracted_bytes: parse_var(
                    "MAX_EXTRACTED_BYTES",
                    defaults.upload.max_extracted_bytes,
                )?,
                max_archive_entries: parse_var(
                    "MAX_ARCHIVE_ENTRIES",
                    defaults.upload.max_archive_entries,
                )?,
            },
            render: RenderConfig {
                max_concurrent_renders: parse_var(
                    "MAX_CONCURRENT_RENDERS",
                    defaults.render.max_concurrent_renders,
                )?
                .max(1),
                timeout_secs: parse_var("RENDER_TIMEOUT_SECS", defaults.render.timeout_secs)?,
                chrome_path: env::var("CHROME_PATH").ok().map(PathBuf::from),
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
        Err(_) => Ok(default),
    }
}
