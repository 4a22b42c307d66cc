//! Common test utilities for tcia-dl integration tests

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tcia_dl::{BatchDownloader, Config, RetryConfig};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock image endpoint is mounted on
pub const GET_IMAGE_PATH: &str = "/services/v3/TCIA/query/getImage";

/// Metadata header value announcing a ZIP payload
pub const ZIP_METADATA: &str = r#"{"Result": {"Type": ["ZIP"]}}"#;

/// Fake ZIP payload for a series
pub fn zip_body(series_id: &str) -> Vec<u8> {
    let mut body = b"PK\x03\x04".to_vec();
    body.extend_from_slice(series_id.as_bytes());
    body
}

/// Render a manifest in the format the TCIA data retriever writes
pub fn manifest_text(series: &[&str], retries: Option<u32>) -> String {
    let mut text = String::from(concat!(
        "downloadServerUrl=",
        "https://public.cancerimagingarchive.net/nbia-download/servlet/DownloadServlet\n",
        "includeAnnotation=true\n",
    ));
    if let Some(retries) = retries {
        text.push_str(&format!("noOfrRetry={}\n", retries));
    }
    text.push_str("databasketId=manifest-test.tcia\nmanifestVersion=3.0\n");
    text.push_str("ListOfSeriesToDownload=\n");
    for series_id in series {
        text.push_str(series_id);
        text.push('\n');
    }
    text
}

/// Write a manifest named `name` into `dir`
pub fn write_manifest(dir: &Path, name: &str, series: &[&str], retries: Option<u32>) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, manifest_text(series, retries)).expect("failed to write manifest");
    path
}

/// Config pointed at `server` with a short retry delay
pub fn test_config(server: &MockServer, concurrency: usize) -> Config {
    Config {
        server_url: format!("{}{}", server.uri(), GET_IMAGE_PATH),
        concurrency,
        retry: RetryConfig {
            delay: Duration::from_millis(10),
            ..RetryConfig::default()
        },
        ..Config::default()
    }
}

/// Downloader pointed at `server`
pub fn test_downloader(server: &MockServer, concurrency: usize) -> BatchDownloader {
    BatchDownloader::new(test_config(server, concurrency)).expect("failed to build downloader")
}

/// Serve `series_id` as a ZIP archive
pub async fn mount_series(server: &MockServer, series_id: &str) {
    Mock::given(method("GET"))
        .and(path(GET_IMAGE_PATH))
        .and(query_param("SeriesInstanceUID", series_id))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("metadata", ZIP_METADATA)
                .set_body_bytes(zip_body(series_id)),
        )
        .mount(server)
        .await;
}

/// Answer every request for `series_id` with `status`
pub async fn mount_failing_series(server: &MockServer, series_id: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(GET_IMAGE_PATH))
        .and(query_param("SeriesInstanceUID", series_id))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Number of requests the server received for `series_id`
pub async fn requests_for(server: &MockServer, series_id: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| {
            request
                .url
                .query_pairs()
                .any(|(key, value)| key == "SeriesInstanceUID" && value == series_id)
        })
        .count()
}

/// In-memory log sink for asserting on console output
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Route this thread's `tracing` output at INFO and above into the buffer
    ///
    /// `#[tokio::test]` runs spawned tasks on the test thread, so their logs are
    /// captured too. Capture stops when the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || sink.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Captured lines
    pub fn lines(&self) -> Vec<String> {
        let buf = self.0.lock().expect("log buffer poisoned");
        String::from_utf8_lossy(&buf)
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .expect("log buffer poisoned")
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
