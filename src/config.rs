//! Startup configuration
//!
//! Loaded from the environment (via `dotenvy`) with documented defaults.
//! Mirrors the manual `Config::from_env()` / `Default` pairing this codebase
//! already uses for its server configuration, rather than reaching for a
//! config-file crate.

use std::path::PathBuf;

use thiserror::Error;

/// Default chunk size: 5MB
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Default session retention horizon: 24 hours
const DEFAULT_SESSION_RETENTION_HOURS: i64 = 24;

/// Default scratch retention horizon: 1 hour
const DEFAULT_SCRATCH_RETENTION_HOURS: i64 = 1;

/// Default janitor sweep interval: 1 hour
const DEFAULT_JANITOR_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listener port
    pub port: u16,

    /// SQLite connection string, e.g. `sqlite://upload.db`
    pub database_url: String,

    /// Directory where assembled target files live
    pub upload_dir: PathBuf,

    /// Directory where in-flight chunk spools live
    pub temp_dir: PathBuf,

    /// Chunk size in bytes (overridable for tests)
    pub chunk_size: u64,

    /// How long an `UPLOADING`/`FAILED` session survives before the janitor reclaims it
    pub session_retention_hours: i64,

    /// How long an orphaned scratch file survives before the janitor reclaims it
    pub scratch_retention_hours: i64,

    /// Interval between janitor sweeps
    pub janitor_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("PORT") {
            Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                field: "PORT",
                value: v,
            })?,
            Err(_) => 3001,
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://upload.db".to_string());

        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("upload"));

        let temp_dir = std::env::var("TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("temp"));

        let chunk_size = match std::env::var("CHUNK_SIZE") {
            Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                field: "CHUNK_SIZE",
                value: v,
            })?,
            Err(_) => DEFAULT_CHUNK_SIZE,
        };

        let session_retention_hours = match std::env::var("SESSION_RETENTION_HOURS") {
            Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                field: "SESSION_RETENTION_HOURS",
                value: v,
            })?,
            Err(_) => DEFAULT_SESSION_RETENTION_HOURS,
        };

        let scratch_retention_hours = match std::env::var("SCRATCH_RETENTION_HOURS") {
            Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                field: "SCRATCH_RETENTION_HOURS",
                value: v,
            })?,
            Err(_) => DEFAULT_SCRATCH_RETENTION_HOURS,
        };

        let janitor_interval_secs = match std::env::var("JANITOR_INTERVAL_SECS") {
            Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                field: "JANITOR_INTERVAL_SECS",
                value: v,
            })?,
            Err(_) => DEFAULT_JANITOR_INTERVAL_SECS,
        };

        Ok(Self {
            port,
            database_url,
            upload_dir,
            temp_dir,
            chunk_size,
            session_retention_hours,
            scratch_retention_hours,
            janitor_interval_secs,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3001,
            database_url: "sqlite://upload.db".to_string(),
            upload_dir: PathBuf::from("upload"),
            temp_dir: PathBuf::from("temp"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            session_retention_hours: DEFAULT_SESSION_RETENTION_HOURS,
            scratch_retention_hours: DEFAULT_SCRATCH_RETENTION_HOURS,
            janitor_interval_secs: DEFAULT_JANITOR_INTERVAL_SECS,
        }
    }
}
