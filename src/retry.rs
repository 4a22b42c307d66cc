//! Retry logic with a bounded attempt budget
//!
//! Transient failures are retried after a fixed [`RetryConfig::delay`] until the
//! budget runs out. The executor only logs at debug level; callers report failures
//! through the `on_retry` hook and the returned error.
//!
//! # Example
//!
//! ```no_run
//! use tcia_dl::retry::{IsRetryable, download_with_retry};
//! use tcia_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default().with_max_attempts(3);
//! download_with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the operation should be attempted again after this error
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Connection failures, timeouts and HTTP error statuses alike
            Error::Network(_) => true,
            // Local write failures and truncated bodies
            Error::Io(_) => true,
            // Garbled metadata header
            Error::Serialization(_) => true,
            // Counts against the retry budget like any other failed attempt
            Error::UnexpectedContentType { .. } => true,
            // Setup errors never get better by waiting
            Error::Config { .. }
            | Error::ManifestNotFound(_)
            | Error::ManifestAccess { .. }
            | Error::InvalidManifest(_) => false,
            Error::InvalidSeriesId(_) | Error::Other(_) => false,
        }
    }
}

/// Execute an async operation, retrying retryable failures
///
/// The operation runs once, then up to `config.max_attempts` more times. Returns the
/// first success, or the last error once the budget is spent or a non-retryable error
/// is seen.
pub async fn download_with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    download_with_retry_notify(config, operation, |_, _, _| {}).await
}

/// Like [`download_with_retry`], calling `on_retry(attempt, error, delay)` before each
/// wait
///
/// `attempt` is the 1-based number of the retry about to happen.
pub async fn download_with_retry_notify<F, Fut, T, E, N>(
    config: &RetryConfig,
    mut operation: F,
    mut on_retry: N,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
    N: FnMut(u32, &E, Duration),
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;
                tracing::debug!(
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = config.delay.as_millis(),
                    "Operation failed, retrying"
                );
                on_retry(attempt, &e, config.delay);
                tokio::time::sleep(config.delay).await;
            }
            Err(e) => {
                tracing::debug!(
                    error = %e,
                    attempts = attempt + 1,
                    retryable = e.is_retryable(),
                    "Operation failed"
                );
                return Err(e);
            }
        }
    }
}
