//! Batch orchestration split into focused submodules.
//!
//! - [`setup`] - Manifest path validation, destination folder and provenance copy
//! - [`batch`] - Manifest-driven runs and bounded fan-out of series fetches

mod batch;
mod setup;

pub use setup::destination_folder;

use crate::config::Config;
use crate::error::Result;
use crate::fetcher::SeriesFetcher;
use crate::types::Event;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the event channel; slow subscribers lose the oldest events
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Runs manifest batches (cloneable - all fields are cheap to share)
#[derive(Clone)]
pub struct BatchDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Fetcher shared by every job; its HTTP client pools connections
    pub(crate) fetcher: SeriesFetcher,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
}

impl BatchDownloader {
    /// Create a downloader after validating `config`
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let fetcher = SeriesFetcher::new(&config)?.with_events(event_tx.clone());

        Ok(Self {
            config: Arc::new(config),
            fetcher,
            event_tx,
        })
    }

    /// Subscribe to batch events
    ///
    /// Only events sent after this call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetcher used for individual series
    pub fn fetcher(&self) -> &SeriesFetcher {
        &self.fetcher
    }

    pub(crate) fn emit(&self, event: Event) {
        // No subscribers is not an error
        self.event_tx.send(event).ok();
    }
}
