//! TCIA manifest parsing
//!
//! A manifest is a line-oriented text file. `KEY=VALUE` lines start a new key; the
//! lines that follow without an `=` are appended to that key's values:
//!
//! ```text
//! downloadServerUrl=https://public.cancerimagingarchive.net/nbia-download/servlet/DownloadServlet
//! includeAnnotation=true
//! noOfrRetry=4
//! ListOfSeriesToDownload=
//! 1.3.6.1.4.1.14519.5.2.1.7695.1700.277743171070833720282648319465
//! 1.3.6.1.4.1.14519.5.2.1.7695.1700.153974929648969296590126728101
//! ```

use crate::error::{Error, Result};
use std::path::Path;

/// Key listing one series instance UID per following line
pub const SERIES_LIST_KEY: &str = "ListOfSeriesToDownload";

/// Key holding the per-series retry budget
pub const RETRY_COUNT_KEY: &str = "noOfrRetry";

/// Parsed manifest: keys in file order, each with its list of values
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<(String, Vec<String>)>,
}

impl Manifest {
    /// Parse manifest text
    ///
    /// Lines before the first `KEY=` line are dropped. A key seen twice keeps its first
    /// position but starts over with the values of its latest occurrence.
    pub fn parse(text: &str) -> Self {
        let mut manifest = Manifest::default();
        let mut current: Option<usize> = None;

        for line in text.lines() {
            let line = line.trim();

            if let Some((key, value)) = line.split_once('=') {
                let values = if value.is_empty() {
                    Vec::new()
                } else {
                    vec![value.trim().to_string()]
                };
                let key = key.trim();
                let index = manifest.insert(key, values);
                // An empty key is stored but cannot collect continuation lines
                current = (!key.is_empty()).then_some(index);
            } else if let Some(index) = current
                && !line.is_empty()
            {
                manifest.entries[index].1.push(line.to_string());
            }
        }

        manifest
    }

    /// Read and parse a manifest file
    pub async fn from_path(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| Error::ManifestAccess {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::parse(&text))
    }

    fn insert(&mut self, key: &str, values: Vec<String>) -> usize {
        match self.entries.iter().position(|(k, _)| k == key) {
            Some(index) => {
                self.entries[index].1 = values;
                index
            }
            None => {
                self.entries.push((key.to_string(), values));
                self.entries.len() - 1
            }
        }
    }

    /// Values of `key`; empty if the key is absent
    pub fn get(&self, key: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    /// Whether `key` appeared in the manifest, even with no values
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Keys in file order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the manifest has no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Series instance UIDs to download, in manifest order
    pub fn series_ids(&self) -> &[String] {
        self.get(SERIES_LIST_KEY)
    }

    /// Retry budget for every series in this manifest
    ///
    /// A missing or empty `noOfrRetry` means no retries. Anything other than a
    /// non-negative integer is rejected.
    pub fn retry_budget(&self) -> Result<u32> {
        match self.get(RETRY_COUNT_KEY).first() {
            None => {
                tracing::warn!(key = RETRY_COUNT_KEY, "Retry count missing, defaulting to 0");
                Ok(0)
            }
            Some(raw) => raw.parse::<u32>().map_err(|e| {
                Error::InvalidManifest(format!(
                    "{} must be a non-negative integer, got '{}': {}",
                    RETRY_COUNT_KEY, raw, e
                ))
            }),
        }
    }
}
