//! # tcia-dl
//!
//! Manifest-driven bulk downloader for imaging series hosted by The Cancer Imaging
//! Archive (TCIA).
//!
//! A TCIA manifest lists series instance UIDs and a retry count. Each series is
//! fetched as a ZIP archive into a folder named after the manifest, with a bounded
//! number of series in flight. Series that are already on disk are skipped, so an
//! interrupted batch can simply be run again.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tcia_dl::{BatchDownloader, Config, Event};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = BatchDownloader::new(Config {
//!         concurrency: 8,
//!         ..Default::default()
//!     })?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let Event::Progress { completed, total } = event {
//!                 println!("{completed}/{total}");
//!             }
//!         }
//!     });
//!
//!     let report = downloader
//!         .download_manifest(Path::new("lung.tcia"), Path::new("downloads"))
//!         .await?;
//!     for series_id in &report.failed {
//!         eprintln!("missing: {series_id}");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Batch orchestration
pub mod downloader;
/// Error types
pub mod error;
/// Single-series retrieval
pub mod fetcher;
/// Manifest parsing
pub mod manifest;
/// Retry logic with a bounded attempt budget
pub mod retry;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, RetryConfig};
pub use downloader::BatchDownloader;
pub use error::{Error, Result};
pub use fetcher::SeriesFetcher;
pub use manifest::Manifest;
pub use types::{BatchReport, DownloadJob, Event, FetchOutcome};
