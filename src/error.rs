//! Error types for tcia-dl
//!
//! Errors fall into two groups:
//! - Setup errors (bad manifest path, unreadable or malformed manifest, invalid
//!   configuration) abort a batch before any series is fetched.
//! - Per-series errors (network, HTTP status, metadata, local I/O) are retried by
//!   the fetcher and end up in [`crate::types::FetchOutcome::Failed`]; they are
//!   never returned from a batch run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tcia-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tcia-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "concurrency")
        key: Option<String>,
    },

    /// Manifest path does not exist or is not a regular file
    #[error("{} does not exist or is not a file", .0.display())]
    ManifestNotFound(PathBuf),

    /// Manifest file exists but could not be read
    #[error("failed to read manifest {}: {source}", path.display())]
    ManifestAccess {
        /// Path of the manifest that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Manifest could be read but a value the run depends on is unusable
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// The service answered, but the payload is not a ZIP archive
    #[error("invalid series ID {series_id}: expected a ZIP file, got {found:?}")]
    UnexpectedContentType {
        /// Series that was requested
        series_id: String,
        /// Type tag reported in the `metadata` header (empty if missing)
        found: String,
    },

    /// Series ID cannot be used as an archive file name
    #[error("invalid series ID {0:?}: must be a plain file name")]
    InvalidSeriesId(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network or HTTP status error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error (metadata header, config file)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Whether this error aborts a batch before any download starts
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Error::Config { .. }
                | Error::ManifestNotFound(_)
                | Error::ManifestAccess { .. }
                | Error::InvalidManifest(_)
        )
    }
}
