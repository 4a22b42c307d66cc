//! Core types: per-series outcomes, batch reports and lifecycle events

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// One series to fetch and where its archive goes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadJob {
    /// Series instance UID
    pub series_id: String,
    /// `<destination folder>/<series_id>.zip`
    pub destination: PathBuf,
}

impl DownloadJob {
    /// Job for `series_id` writing into `folder`
    ///
    /// Fails with [`Error::InvalidSeriesId`] unless `<series_id>.zip` is a plain file
    /// name, so no manifest entry can write outside `folder`.
    pub fn new(series_id: &str, folder: &Path) -> Result<Self> {
        let file_name = format!("{series_id}.zip");
        let mut components = Path::new(&file_name).components();
        let plain = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !plain || series_id.contains(['/', '\\']) {
            return Err(Error::InvalidSeriesId(series_id.to_string()));
        }

        Ok(Self {
            series_id: series_id.to_string(),
            destination: folder.join(file_name),
        })
    }
}

/// Result of fetching one series
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// Series was retrieved and written to `path`
    Downloaded {
        /// Series instance UID
        series_id: String,
        /// Final location of the ZIP archive
        path: PathBuf,
        /// Attempts used, including the successful one
        attempts: u32,
        /// Bytes written
        bytes: u64,
    },

    /// A file already existed at `path`; the service was not contacted
    Skipped {
        /// Series instance UID
        series_id: String,
        /// Existing file
        path: PathBuf,
    },

    /// Every attempt failed; nothing exists at `path`
    Failed {
        /// Series instance UID
        series_id: String,
        /// Where the archive would have been written
        path: PathBuf,
        /// Attempts made
        attempts: u32,
        /// Error from the last attempt
        error: String,
    },
}

impl FetchOutcome {
    /// Series instance UID this outcome belongs to
    pub fn series_id(&self) -> &str {
        match self {
            FetchOutcome::Downloaded { series_id, .. }
            | FetchOutcome::Skipped { series_id, .. }
            | FetchOutcome::Failed { series_id, .. } => series_id,
        }
    }

    /// Destination path of the series archive
    pub fn path(&self) -> &PathBuf {
        match self {
            FetchOutcome::Downloaded { path, .. }
            | FetchOutcome::Skipped { path, .. }
            | FetchOutcome::Failed { path, .. } => path,
        }
    }

    /// True for downloaded and skipped series
    pub fn is_success(&self) -> bool {
        !matches!(self, FetchOutcome::Failed { .. })
    }
}

/// Summary of a finished batch
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchReport {
    /// Folder the series were written to
    pub destination: PathBuf,
    /// Number of series listed in the manifest
    pub total: usize,
    /// Series fetched during this run
    pub downloaded: usize,
    /// Series already present before the run
    pub skipped: usize,
    /// Series that could not be fetched, in completion order
    pub failed: Vec<String>,
    /// When dispatching started
    pub started_at: DateTime<Utc>,
    /// When the last job finished
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    pub(crate) fn from_outcomes(
        destination: PathBuf,
        outcomes: &[FetchOutcome],
        started_at: DateTime<Utc>,
    ) -> Self {
        let mut report = BatchReport {
            destination,
            total: outcomes.len(),
            downloaded: 0,
            skipped: 0,
            failed: Vec::new(),
            started_at,
            finished_at: Utc::now(),
        };
        for outcome in outcomes {
            match outcome {
                FetchOutcome::Downloaded { .. } => report.downloaded += 1,
                FetchOutcome::Skipped { .. } => report.skipped += 1,
                FetchOutcome::Failed { series_id, .. } => report.failed.push(series_id.clone()),
            }
        }
        report
    }

    /// True when every listed series is now on disk
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Event emitted during a batch run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Manifest parsed, jobs about to be dispatched
    BatchStarted {
        /// Destination folder
        destination: PathBuf,
        /// Number of series to fetch
        total: usize,
    },

    /// A series attempt failed and will be retried
    SeriesRetrying {
        /// Series instance UID
        series_id: String,
        /// 1-based retry number
        attempt: u32,
        /// Retry budget
        max_retries: u32,
        /// Error from the failed attempt
        error: String,
    },

    /// A series finished (downloaded, skipped or failed)
    SeriesFinished(FetchOutcome),

    /// Completion counter after a series finished
    Progress {
        /// Series finished so far
        completed: usize,
        /// Series in the batch
        total: usize,
    },

    /// Every job has finished
    BatchFinished(BatchReport),
}
