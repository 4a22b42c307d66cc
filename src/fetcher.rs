//! Single-series retrieval with bounded retries
//!
//! [`SeriesFetcher::fetch`] turns one series instance UID into a ZIP archive on disk.
//! It never returns an error: whatever happens is reported as a [`FetchOutcome`], so a
//! batch can keep going when individual series fail.

use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::download_with_retry_notify;
use crate::types::{Event, FetchOutcome};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;

/// Response header carrying the series metadata JSON
pub const METADATA_HEADER: &str = "metadata";

/// Query parameter naming the requested series
pub const SERIES_QUERY_PARAM: &str = "SeriesInstanceUID";

/// Only payload type the fetcher accepts
pub const EXPECTED_CONTENT_TYPE: &str = "ZIP";

/// `{"Result": {"Type": ["ZIP", ...]}}`
#[derive(Debug, Default, Deserialize)]
struct SeriesMetadata {
    #[serde(rename = "Result", default)]
    result: MetadataResult,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataResult {
    #[serde(rename = "Type", default)]
    types: Vec<String>,
}

/// Downloads series archives from the image retrieval endpoint
#[derive(Clone)]
pub struct SeriesFetcher {
    client: reqwest::Client,
    server_url: url::Url,
    chunk_size: usize,
    retry: RetryConfig,
    event_tx: Option<broadcast::Sender<Event>>,
}

impl SeriesFetcher {
    /// Build a fetcher from the endpoint, timeout, buffer and retry settings in `config`
    pub fn new(config: &Config) -> Result<Self> {
        let server_url = url::Url::parse(&config.server_url).map_err(|e| {
            Error::config(
                "server_url",
                format!("invalid URL '{}': {}", config.server_url, e),
            )
        })?;

        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            server_url,
            chunk_size: config.chunk_size,
            retry: config.retry.clone(),
            event_tx: None,
        })
    }

    /// Publish retry notifications on `event_tx`
    pub fn with_events(mut self, event_tx: broadcast::Sender<Event>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Endpoint this fetcher downloads from
    pub fn server_url(&self) -> &url::Url {
        &self.server_url
    }

    /// Fetch `series_id` into `dest`, retrying up to `max_retries` times after the
    /// first attempt
    ///
    /// An existing file at `dest` is accepted as-is without contacting the service.
    pub async fn fetch(&self, series_id: &str, dest: &Path, max_retries: u32) -> FetchOutcome {
        if tokio::fs::try_exists(dest).await.unwrap_or(false) {
            tracing::debug!(series_id, path = %dest.display(), "Series already present, skipping");
            return FetchOutcome::Skipped {
                series_id: series_id.to_string(),
                path: dest.to_path_buf(),
            };
        }

        let retry = self.retry.with_max_attempts(max_retries);
        let mut attempts = 0u32;

        let result = download_with_retry_notify(
            &retry,
            || {
                attempts += 1;
                self.attempt(series_id, dest)
            },
            |attempt, error, _| {
                tracing::warn!(
                    series_id,
                    attempt,
                    max_retries,
                    error = %error,
                    "Error downloading series, retrying"
                );
                self.emit(Event::SeriesRetrying {
                    series_id: series_id.to_string(),
                    attempt,
                    max_retries,
                    error: error.to_string(),
                });
            },
        )
        .await;

        match result {
            Ok(bytes) => {
                tracing::debug!(
                    series_id,
                    bytes,
                    attempts,
                    path = %dest.display(),
                    "Series downloaded"
                );
                FetchOutcome::Downloaded {
                    series_id: series_id.to_string(),
                    path: dest.to_path_buf(),
                    attempts,
                    bytes,
                }
            }
            Err(e) => {
                tracing::error!(
                    series_id,
                    attempts,
                    max_retries,
                    error = %e,
                    "Failed to download series after all retries"
                );
                FetchOutcome::Failed {
                    series_id: series_id.to_string(),
                    path: dest.to_path_buf(),
                    attempts,
                    error: e.to_string(),
                }
            }
        }
    }

    /// One request: check the metadata, then stream the body to disk
    async fn attempt(&self, series_id: &str, dest: &Path) -> Result<u64> {
        let response = self
            .client
            .get(self.server_url.clone())
            .query(&[(SERIES_QUERY_PARAM, series_id)])
            .send()
            .await?
            .error_for_status()?;

        let found = content_type(&response)?;
        if found != EXPECTED_CONTENT_TYPE {
            return Err(Error::UnexpectedContentType {
                series_id: series_id.to_string(),
                found,
            });
        }

        let part = part_path(dest);
        match self.write_body(response, &part, dest).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&part).await
                    && cleanup.kind() != std::io::ErrorKind::NotFound
                {
                    tracing::warn!(
                        path = %part.display(),
                        error = %cleanup,
                        "Failed to remove partial download"
                    );
                }
                Err(e)
            }
        }
    }

    async fn write_body(
        &self,
        mut response: reqwest::Response,
        part: &Path,
        dest: &Path,
    ) -> Result<u64> {
        let file = tokio::fs::File::create(part).await?;
        let mut writer = tokio::io::BufWriter::with_capacity(self.chunk_size, file);
        let mut bytes = 0u64;

        while let Some(chunk) = response.chunk().await? {
            if chunk.is_empty() {
                continue;
            }
            writer.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        writer.flush().await?;
        drop(writer);

        tokio::fs::rename(part, dest).await?;
        Ok(bytes)
    }

    fn emit(&self, event: Event) {
        if let Some(tx) = &self.event_tx {
            tx.send(event).ok();
        }
    }
}

/// First entry of `Result.Type` in the metadata header; empty if absent
fn content_type(response: &reqwest::Response) -> Result<String> {
    let metadata = match response.headers().get(METADATA_HEADER) {
        Some(value) => serde_json::from_slice::<SeriesMetadata>(value.as_bytes())?,
        None => SeriesMetadata::default(),
    };
    Ok(metadata.result.types.into_iter().next().unwrap_or_default())
}

/// Sibling path the body is streamed into before it is moved onto `dest`
fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
