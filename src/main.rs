//! tcia-dl command line interface
//!
//! ```text
//! tcia-dl -m lung.tcia -o downloads --njobs 8
//! ```

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tcia_dl::{BatchDownloader, Config, Event};
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "tcia-dl")]
#[command(
    version,
    about = "Download imaging series from The Cancer Imaging Archive using a manifest file",
    long_about = None
)]
struct Cli {
    /// The manifest file
    #[arg(short = 'm', long = "manifest", value_name = "FILE")]
    manifest: PathBuf,

    /// The folder to download the series into
    #[arg(short = 'o', long = "output-folder", value_name = "DIR")]
    output_folder: PathBuf,

    /// Number of concurrent downloads [default: 5]
    #[arg(long = "njobs", value_name = "N")]
    njobs: Option<usize>,

    /// JSON configuration file; flags override its values
    #[arg(long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Image retrieval endpoint
    #[arg(long = "server-url", value_name = "URL")]
    server_url: Option<String>,

    /// Delay between retries of one series, in milliseconds
    #[arg(long = "retry-delay-ms", value_name = "MS")]
    retry_delay_ms: Option<u64>,

    /// Per-request timeout in seconds (no timeout by default)
    #[arg(long = "timeout-secs", value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Disable the progress bar
    #[arg(long = "no-progress")]
    no_progress: bool,

    /// Print the batch report as JSON on stdout
    #[arg(long = "json")]
    json: bool,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

impl Cli {
    fn build_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(njobs) = self.njobs {
            config.concurrency = njobs;
        }
        if let Some(url) = &self.server_url {
            config.server_url = url.clone();
        }
        if let Some(ms) = self.retry_delay_ms {
            config.retry.delay = Duration::from_millis(ms);
        }
        if let Some(secs) = self.timeout_secs {
            config.request_timeout = Some(Duration::from_secs(secs));
        }

        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "tcia_dl=debug"
    } else {
        "tcia_dl=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar() -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{msg} {spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({elapsed}, eta {eta})",
        )?
        .progress_chars("#>-"),
    );
    pb.set_message("Downloading");
    Ok(pb)
}

/// Drive `pb` from batch events until the batch finishes
async fn track_progress(mut events: broadcast::Receiver<Event>, pb: ProgressBar) {
    loop {
        match events.recv().await {
            Ok(Event::BatchStarted { total, .. }) => pb.set_length(total as u64),
            Ok(Event::Progress { completed, .. }) => pb.set_position(completed as u64),
            Ok(Event::BatchFinished(_)) => break,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Progress display lagged behind events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    pb.finish();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.build_config()?;
    let downloader = BatchDownloader::new(config).context("invalid configuration")?;

    let progress = if cli.no_progress {
        None
    } else {
        let pb = progress_bar()?;
        Some(tokio::spawn(track_progress(downloader.subscribe(), pb)))
    };

    let result = downloader
        .download_manifest(&cli.manifest, &cli.output_folder)
        .await;

    if let Some(handle) = progress {
        if result.is_ok() {
            handle.await.ok();
        } else {
            handle.abort();
        }
    }

    let report = result.with_context(|| format!("downloading {}", cli.manifest.display()))?;

    for series_id in &report.failed {
        tracing::warn!(series_id = %series_id, "Series missing from destination");
    }
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
