//! Manifest-driven batch runs.

use super::BatchDownloader;
use super::setup::{
    archive_manifest, destination_folder, prepare_destination, validate_manifest_path,
};
use crate::error::Result;
use crate::manifest::Manifest;
use crate::types::{BatchReport, DownloadJob, Event, FetchOutcome};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::Path;

impl BatchDownloader {
    /// Download every series listed in the manifest at `manifest_path`
    ///
    /// Series land in `<output_root>/<manifest file name>/<series_id>.zip`, next to a
    /// copy of the manifest. Setup problems (missing manifest, unreadable file, bad
    /// retry count) are returned before anything is created on disk. Failed series
    /// never fail the batch; they are listed in [`BatchReport::failed`].
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tcia_dl::{BatchDownloader, Config};
    /// use std::path::Path;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = BatchDownloader::new(Config::default())?;
    ///     let report = downloader
    ///         .download_manifest(Path::new("lung.tcia"), Path::new("downloads"))
    ///         .await?;
    ///     println!("{} failed", report.failed.len());
    ///     Ok(())
    /// }
    /// ```
    pub async fn download_manifest(
        &self,
        manifest_path: &Path,
        output_root: &Path,
    ) -> Result<BatchReport> {
        validate_manifest_path(manifest_path).await?;
        let destination = destination_folder(manifest_path, output_root)?;

        tracing::info!(manifest = %manifest_path.display(), "Parsing manifest file");
        let manifest = Manifest::from_path(manifest_path).await?;
        let max_retries = manifest.retry_budget()?;

        prepare_destination(&destination).await?;
        archive_manifest(manifest_path, &destination).await?;

        let (jobs, rejected) = plan_jobs(manifest.series_ids(), &destination);

        tracing::info!(
            count = jobs.len(),
            destination = %destination.display(),
            max_retries,
            concurrency = self.config.concurrency,
            "Downloading series"
        );
        self.emit(Event::BatchStarted {
            destination: destination.clone(),
            total: jobs.len(),
        });

        let started_at = Utc::now();
        let mut outcomes = rejected;
        outcomes.extend(self.run_jobs(jobs, max_retries).await);
        let report = BatchReport::from_outcomes(destination, &outcomes, started_at);

        tracing::info!(
            downloaded = report.downloaded,
            skipped = report.skipped,
            failed = report.failed.len(),
            "Done."
        );
        self.emit(Event::BatchFinished(report.clone()));

        Ok(report)
    }

    /// Fetch `jobs` with at most `concurrency` in flight
    ///
    /// Outcomes are returned in completion order. The destination folders must exist.
    pub async fn run_jobs(&self, jobs: Vec<DownloadJob>, max_retries: u32) -> Vec<FetchOutcome> {
        let total = jobs.len();

        let mut finished = stream::iter(jobs)
            .map(|job| {
                let fetcher = self.fetcher.clone();
                let DownloadJob {
                    series_id,
                    destination,
                } = job.clone();
                let handle = tokio::spawn(async move {
                    fetcher
                        .fetch(&job.series_id, &job.destination, max_retries)
                        .await
                });

                async move {
                    match handle.await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            tracing::error!(
                                series_id = %series_id,
                                error = %e,
                                "Download task panicked"
                            );
                            FetchOutcome::Failed {
                                series_id,
                                path: destination,
                                attempts: 0,
                                error: format!("download task panicked: {}", e),
                            }
                        }
                    }
                }
            })
            .buffer_unordered(self.config.concurrency);

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = finished.next().await {
            let completed = outcomes.len() + 1;
            tracing::info!(
                series_id = outcome.series_id(),
                completed,
                total,
                success = outcome.is_success(),
                "Downloading"
            );
            self.emit(Event::SeriesFinished(outcome.clone()));
            self.emit(Event::Progress { completed, total });
            outcomes.push(outcome);
        }

        outcomes
    }
}

/// Turn manifest entries into jobs
///
/// Repeated IDs are fetched once. IDs that cannot be used as a file name are
/// returned as failed outcomes without contacting the service.
fn plan_jobs(series_ids: &[String], destination: &Path) -> (Vec<DownloadJob>, Vec<FetchOutcome>) {
    let mut seen = HashSet::new();
    let mut jobs = Vec::with_capacity(series_ids.len());
    let mut rejected = Vec::new();

    for series_id in series_ids {
        if !seen.insert(series_id.as_str()) {
            tracing::warn!(
                series_id = %series_id,
                "Series listed more than once, fetching it once"
            );
            continue;
        }
        match DownloadJob::new(series_id, destination) {
            Ok(job) => jobs.push(job),
            Err(e) => {
                tracing::error!(series_id = %series_id, error = %e, "Skipping series");
                rejected.push(FetchOutcome::Failed {
                    series_id: series_id.clone(),
                    path: destination.to_path_buf(),
                    attempts: 0,
                    error: e.to_string(),
                });
            }
        }
    }

    (jobs, rejected)
}
