//! Source connectors for legal portals.
//!
//! A [`Connector`] turns one origin's website into batches of
//! [`LawRecord`]s and knows how to fetch the PDF behind a record. Connectors
//! never touch storage: the orchestrator persists what they return and owns
//! the resume marker between batches.

pub mod download;
pub mod fetcher;
pub mod rondonia;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use leizilla_shared::{AppConfig, LawRecord, LeizillaError, Result};
use tracing::info;

pub use download::{download_pdf, write_atomic};
pub use fetcher::{FetchedBinary, HttpFetcher, PageFetcher};
pub use rondonia::RondoniaConnector;

// ---------------------------------------------------------------------------
// Discovery contract
// ---------------------------------------------------------------------------

/// Inputs to one discovery batch.
#[derive(Debug, Clone, Default)]
pub struct DiscoverParams {
    /// Opaque position returned by the previous batch; `None` starts at the beginning.
    pub resume_marker: Option<String>,
    /// Explicit first page, overriding the marker.
    pub start: Option<u64>,
    /// Inclusive last page.
    pub end: Option<u64>,
    /// Pages (visited or failed) allowed in this batch.
    pub max_pages: u32,
    /// Consecutive empty pages after which the source counts as exhausted.
    /// `0` disables the check.
    pub max_empty_pages: u32,
}

/// Result of one discovery batch.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryBatch {
    pub records: Vec<LawRecord>,
    pub pages_visited: u32,
    /// Pages whose fetch failed; skipped and counted, not retried.
    pub failed_pages: u32,
    /// Pages that held a law that could not be turned into a record.
    pub skipped_records: u32,
    /// Position to resume from next time. `None` keeps the caller's marker:
    /// nothing was visited, or only empty pages that may fill in later.
    pub next_marker: Option<String>,
    /// The source has nothing beyond `next_marker`.
    pub exhausted: bool,
}

impl DiscoveryBatch {
    /// Every page this batch attempted failed.
    pub fn all_failed(&self) -> bool {
        self.failed_pages > 0 && self.pages_visited == 0
    }
}

/// One legal source.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stable origin key (`rondonia`).
    fn origin(&self) -> &str;

    /// Fetch the next batch of records after `params.resume_marker`.
    ///
    /// Individual page failures are counted in the batch. An error is
    /// returned only when the source could not be reached at all.
    async fn discover(&self, params: &DiscoverParams) -> Result<DiscoveryBatch>;

    /// Download the record's PDF to `destination`. `false` on any failure,
    /// in which case `destination` is not created or modified.
    async fn download(&self, law: &LawRecord, destination: &Path) -> bool;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Origin → connector lookup.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: BTreeMap<String, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector under its own origin. Origins are unique.
    pub fn register(&mut self, connector: Arc<dyn Connector>) -> Result<()> {
        let origin = connector.origin().to_string();
        if self.connectors.contains_key(&origin) {
            return Err(LeizillaError::config(format!(
                "connector for origin '{origin}' already registered"
            )));
        }
        self.connectors.insert(origin, connector);
        Ok(())
    }

    pub fn get(&self, origin: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.get(origin).cloned()
    }

    /// Like [`get`](Self::get) but with a helpful error listing known origins.
    pub fn require(&self, origin: &str) -> Result<Arc<dyn Connector>> {
        self.get(origin).ok_or_else(|| {
            LeizillaError::config(format!(
                "unknown origin '{origin}' (available: {})",
                self.origins().join(", ")
            ))
        })
    }

    pub fn origins(&self) -> Vec<String> {
        self.connectors.keys().cloned().collect()
    }

    /// Registry with every connector enabled in config.
    pub fn with_defaults(config: &AppConfig) -> Result<Self> {
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(&config.crawler)?);
        let page_delay = Duration::from_millis(config.crawler.rate_limit_ms);

        let mut registry = Self::new();
        if config.sources.rondonia.enabled {
            registry.register(Arc::new(RondoniaConnector::new(
                &config.sources.rondonia.base_url,
                Arc::clone(&fetcher),
                page_delay,
            )?))?;
        }
        info!(origins = ?registry.origins(), "connectors registered");
        Ok(registry)
    }
}
