//! Configuration types for tcia-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default TCIA image retrieval endpoint
pub const DEFAULT_SERVER_URL: &str =
    "https://services.cancerimagingarchive.net/services/v3/TCIA/query/getImage";

/// Main configuration for a batch run
///
/// Every field has a default, so a config file only needs the settings it changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Image retrieval endpoint (default: the public TCIA v3 `getImage` service)
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Number of series fetched in parallel (default: 5)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Retry behavior for a single series
    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-request timeout (None = no timeout)
    #[serde(default, with = "optional_duration_serde")]
    pub request_timeout: Option<Duration>,

    /// Write buffer size used when streaming a series to disk (default: 8 KiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            concurrency: default_concurrency(),
            retry: RetryConfig::default(),
            request_timeout: None,
            chunk_size: default_chunk_size(),
            user_agent: default_user_agent(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their defaults. The result is validated before it is returned.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings a batch run cannot work without
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::config("concurrency", "must be at least 1"));
        }
        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size", "must be at least 1 byte"));
        }
        let url = url::Url::parse(&self.server_url).map_err(|e| {
            Error::config(
                "server_url",
                format!("invalid URL '{}': {}", self.server_url, e),
            )
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(
                "server_url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        Ok(())
    }
}

/// Retry configuration for a single series
///
/// The defaults reproduce the archive client's fixed policy: one second between
/// attempts. `max_attempts` is normally replaced per run by the manifest's
/// `noOfrRetry` value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 0)
    #[serde(default)]
    pub max_attempts: u32,

    /// Fixed wait between attempts (default: 1 second)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            delay: default_retry_delay(),
        }
    }
}

impl RetryConfig {
    /// Copy of this policy with a different retry budget
    pub fn with_max_attempts(&self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..self.clone()
        }
    }
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_concurrency() -> usize {
    5
}

fn default_chunk_size() -> usize {
    8192
}

fn default_user_agent() -> String {
    format!("tcia-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}

// Durations are stored as integer milliseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
