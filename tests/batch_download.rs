//! End-to-end batch runs against a mock image endpoint

mod common;

use common::{
    LogCapture, mount_failing_series, mount_series, requests_for, test_downloader,
    write_manifest, zip_body,
};
use std::time::{Duration, Instant};
use tcia_dl::{Error, Event};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn downloads_every_series_and_archives_manifest() {
    let server = MockServer::start().await;
    for series_id in ["S1", "S2", "S3"] {
        mount_series(&server, series_id).await;
    }

    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), "batch.tcia", &["S1", "S2", "S3"], Some(1));
    let output = dir.path().join("out");

    let report = test_downloader(&server, 2)
        .download_manifest(&manifest, &output)
        .await
        .unwrap();

    let destination = output.join("batch.tcia");
    assert_eq!(report.destination, destination);
    assert_eq!(report.total, 3);
    assert_eq!(report.downloaded, 3);
    assert!(report.is_complete());

    for series_id in ["S1", "S2", "S3"] {
        let archive = destination.join(format!("{series_id}.zip"));
        assert_eq!(std::fs::read(&archive).unwrap(), zip_body(series_id));
    }
    assert_eq!(
        std::fs::read_to_string(destination.join("batch.tcia")).unwrap(),
        std::fs::read_to_string(&manifest).unwrap()
    );
}

#[tokio::test]
async fn one_good_one_bad_series() {
    let server = MockServer::start().await;
    mount_series(&server, "1.2.3").await;
    mount_failing_series(&server, "4.5.6", 500).await;

    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), "mixed.tcia", &["1.2.3", "4.5.6"], Some(2));
    let output = dir.path().join("out");

    let report = test_downloader(&server, 1)
        .download_manifest(&manifest, &output)
        .await
        .unwrap();

    let destination = output.join("mixed.tcia");
    assert!(destination.join("1.2.3.zip").exists());
    assert!(!destination.join("4.5.6.zip").exists());
    assert!(!destination.join("4.5.6.zip.part").exists());

    assert_eq!(report.downloaded, 1);
    assert_eq!(report.failed, vec!["4.5.6".to_string()]);
    assert_eq!(requests_for(&server, "1.2.3").await, 1);
    assert_eq!(requests_for(&server, "4.5.6").await, 3, "initial try + 2 retries");
}

#[tokio::test]
async fn failing_series_leaves_one_log_line_per_attempt() {
    let logs = LogCapture::default();
    let _guard = logs.install();

    let server = MockServer::start().await;
    mount_series(&server, "1.2.3").await;
    mount_failing_series(&server, "4.5.6", 500).await;

    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), "trail.tcia", &["1.2.3", "4.5.6"], Some(2));

    test_downloader(&server, 1)
        .download_manifest(&manifest, &dir.path().join("out"))
        .await
        .unwrap();

    let lines: Vec<String> = logs
        .lines()
        .into_iter()
        .filter(|line| line.contains("tcia_dl"))
        .collect();
    let problems: Vec<&String> = lines
        .iter()
        .filter(|line| line.contains("WARN") || line.contains("ERROR"))
        .collect();

    // Two retry warnings and one final error, all naming the series
    assert_eq!(problems.len(), 3, "unexpected log trail: {lines:#?}");
    assert!(
        problems.iter().all(|line| line.contains("series_id=\"4.5.6\"")),
        "every failure line should name its series: {problems:#?}"
    );
    assert_eq!(
        problems.iter().filter(|line| line.contains("retrying")).count(),
        2
    );
    assert!(!lines.iter().any(|line| line.contains("1.2.3") && line.contains("ERROR")));
    assert_eq!(lines.last().map(|line| line.contains("Done.")), Some(true));
    assert_eq!(lines.iter().filter(|line| line.contains("Done.")).count(), 1);
}

#[tokio::test]
async fn duplicate_series_fetched_once() {
    let server = MockServer::start().await;
    mount_series(&server, "S1").await;
    mount_series(&server, "S2").await;

    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), "dupes.tcia", &["S1", "S2", "S1"], Some(0));
    let output = dir.path().join("out");

    let report = test_downloader(&server, 3)
        .download_manifest(&manifest, &output)
        .await
        .unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.downloaded, 2);
    assert_eq!(requests_for(&server, "S1").await, 1);
    let archive = output.join("dupes.tcia").join("S1.zip");
    assert_eq!(std::fs::read(archive).unwrap(), zip_body("S1"));
}

#[tokio::test]
async fn series_id_with_path_separator_is_not_fetched() {
    let server = MockServer::start().await;
    mount_series(&server, "S1").await;

    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), "escape.tcia", &["../../escaped", "S1"], Some(0));
    let output = dir.path().join("out");

    let report = test_downloader(&server, 2)
        .download_manifest(&manifest, &output)
        .await
        .unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.downloaded, 1);
    assert_eq!(report.failed, vec!["../../escaped".to_string()]);
    assert_eq!(requests_for(&server, "../../escaped").await, 0);
    assert!(!dir.path().join("escaped.zip").exists());
}

#[tokio::test]
async fn missing_manifest_fails_before_creating_anything() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("absent.tcia");
    let output = dir.path().join("out");

    let result = test_downloader(&server, 2)
        .download_manifest(&manifest, &output)
        .await;

    assert!(matches!(result, Err(Error::ManifestNotFound(_))));
    assert!(!output.exists());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn directory_is_not_a_manifest() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out");

    let result = test_downloader(&server, 2)
        .download_manifest(dir.path(), &output)
        .await;

    assert!(matches!(result, Err(Error::ManifestNotFound(_))));
    assert!(!output.exists());
}

#[tokio::test]
async fn malformed_retry_count_is_fatal() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("bad.tcia");
    std::fs::write(&manifest, "noOfrRetry=lots\nListOfSeriesToDownload=1.2.3\n").unwrap();
    let output = dir.path().join("out");

    let result = test_downloader(&server, 2)
        .download_manifest(&manifest, &output)
        .await;

    assert!(matches!(result, Err(Error::InvalidManifest(_))));
    assert!(!output.exists());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_retry_count_means_single_attempt() {
    let server = MockServer::start().await;
    mount_failing_series(&server, "7.8.9", 503).await;

    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), "noretry.tcia", &["7.8.9"], None);

    let report = test_downloader(&server, 1)
        .download_manifest(&manifest, &dir.path().join("out"))
        .await
        .unwrap();

    assert_eq!(report.failed, vec!["7.8.9".to_string()]);
    assert_eq!(requests_for(&server, "7.8.9").await, 1);
}

#[tokio::test]
async fn rerun_skips_existing_archives() {
    let server = MockServer::start().await;
    mount_series(&server, "S1").await;
    mount_series(&server, "S2").await;

    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), "rerun.tcia", &["S1", "S2"], Some(0));
    let output = dir.path().join("out");
    let downloader = test_downloader(&server, 2);

    let first = downloader.download_manifest(&manifest, &output).await.unwrap();
    let second = downloader.download_manifest(&manifest, &output).await.unwrap();

    assert_eq!(first.downloaded, 2);
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn empty_series_list_still_finishes() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), "empty.tcia", &[], Some(3));
    let output = dir.path().join("out");

    let report = test_downloader(&server, 2)
        .download_manifest(&manifest, &output)
        .await
        .unwrap();

    assert_eq!(report.total, 0);
    assert!(report.is_complete());
    assert!(output.join("empty.tcia").join("empty.tcia").exists());
}

#[tokio::test]
async fn concurrency_bounds_parallel_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("metadata", common::ZIP_METADATA)
                .set_body_bytes(b"PK".to_vec())
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), "slow.tcia", &["A", "B", "C", "D"], Some(0));

    let start = Instant::now();
    let report = test_downloader(&server, 2)
        .download_manifest(&manifest, &dir.path().join("out"))
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(report.downloaded, 4);
    assert!(
        elapsed >= Duration::from_millis(400),
        "4 jobs at concurrency 2 need two rounds, took {:?}",
        elapsed
    );
    assert!(
        elapsed < Duration::from_millis(790),
        "jobs should overlap, took {:?}",
        elapsed
    );
}

#[tokio::test]
async fn events_track_progress_to_completion() {
    let server = MockServer::start().await;
    mount_series(&server, "S1").await;
    mount_failing_series(&server, "S2", 404).await;
    mount_series(&server, "S3").await;

    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), "events.tcia", &["S1", "S2", "S3"], Some(1));
    let downloader = test_downloader(&server, 3);
    let mut events = downloader.subscribe();

    let report = downloader
        .download_manifest(&manifest, &dir.path().join("out"))
        .await
        .unwrap();

    let mut started = None;
    let mut progress = Vec::new();
    let mut finished = 0;
    let mut retries = 0;
    let mut batch_finished = false;
    while let Ok(event) = events.try_recv() {
        match event {
            Event::BatchStarted { total, .. } => started = Some(total),
            Event::Progress { completed, total } => progress.push((completed, total)),
            Event::SeriesFinished(_) => finished += 1,
            Event::SeriesRetrying { series_id, .. } => {
                assert_eq!(series_id, "S2");
                retries += 1;
            }
            Event::BatchFinished(final_report) => {
                assert_eq!(final_report.failed, report.failed);
                batch_finished = true;
            }
        }
    }

    assert_eq!(started, Some(3));
    assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
    assert_eq!(finished, 3);
    assert_eq!(retries, 1);
    assert!(batch_finished);
    assert_eq!(report.failed, vec!["S2".to_string()]);
}
