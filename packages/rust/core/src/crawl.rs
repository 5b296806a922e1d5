//! Resumable discovery crawl over one connector.
//!
//! The orchestrator alternates between discovering a window of pages and
//! persisting what was found. The resume marker is saved only after the
//! records of its batch are stored, so a crash or Ctrl-C never skips data.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use leizilla_connectors::{Connector, DiscoverParams};
use leizilla_shared::{CrawlConfig, CrawlState, LeizillaError, Result};
use leizilla_storage::Storage;
use tracing::{info, instrument, warn};

use crate::progress::ProgressReporter;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Orchestrator state. Terminal states are `Done`, `Cancelled` and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    Idle,
    Discovering,
    Persisting,
    Done,
    Cancelled,
    Failed,
}

impl CrawlPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a crawl run.
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub origin: String,
    pub phase: CrawlPhase,
    pub batches: u32,
    pub pages_visited: u32,
    pub failed_pages: u32,
    pub discovered: u64,
    pub persisted: u64,
    pub skipped: u64,
    pub marker: Option<String>,
    pub elapsed: Duration,
}

impl CrawlSummary {
    fn new(origin: &str, marker: Option<String>) -> Self {
        Self {
            origin: origin.to_string(),
            phase: CrawlPhase::Idle,
            batches: 0,
            pages_visited: 0,
            failed_pages: 0,
            discovered: 0,
            persisted: 0,
            skipped: 0,
            marker,
            elapsed: Duration::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives one connector from its persisted marker to a terminal state.
pub struct Orchestrator<'a> {
    storage: &'a Storage,
    config: CrawlConfig,
    cancel: CancelFlag,
}

impl<'a> Orchestrator<'a> {
    pub fn new(storage: &'a Storage, config: CrawlConfig, cancel: CancelFlag) -> Self {
        Self {
            storage,
            config,
            cancel,
        }
    }

    /// Run until the source is exhausted, the page bound is hit, the run is
    /// cancelled, or too many consecutive failures occur.
    ///
    /// `Failed` is reported as `Err` after the crawl state has been saved.
    #[instrument(skip_all, fields(origin = connector.origin()))]
    pub async fn run(
        &self,
        connector: &dyn Connector,
        progress: &dyn ProgressReporter,
    ) -> Result<CrawlSummary> {
        let started = Instant::now();
        let origin = connector.origin().to_string();

        let mut state = self
            .storage
            .get_crawl_state(&origin)
            .await?
            .unwrap_or_else(|| CrawlState::new(&origin));
        let mut summary = CrawlSummary::new(&origin, state.resume_marker.clone());

        state.status = CrawlPhase::Discovering.as_str().to_string();
        state.last_error = None;
        self.storage.save_crawl_state(&state).await?;

        info!(
            marker = ?state.resume_marker,
            start = ?self.config.start,
            end = ?self.config.end,
            max_pages = self.config.max_pages,
            "starting crawl"
        );

        let mut pages_used: u32 = 0;
        let mut consecutive_failures: u32 = 0;
        let mut good_batches: u32 = 0;
        let mut start = self.config.start;

        summary.phase = loop {
            if self.cancel.is_cancelled() {
                info!("crawl cancelled");
                break CrawlPhase::Cancelled;
            }
            if pages_used >= self.config.max_pages {
                info!(pages_used, "page bound reached");
                break CrawlPhase::Done;
            }
            if summary.batches > 0 && self.config.rate_limit_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.rate_limit_ms)).await;
                if self.cancel.is_cancelled() {
                    break CrawlPhase::Cancelled;
                }
            }

            progress.phase(CrawlPhase::Discovering.as_str());
            let params = DiscoverParams {
                resume_marker: summary.marker.clone(),
                start,
                end: self.config.end,
                max_pages: self
                    .config
                    .pages_per_batch
                    .min(self.config.max_pages - pages_used),
                max_empty_pages: self.config.max_empty_pages,
            };
            summary.batches += 1;

            let batch = match connector.discover(&params).await {
                Ok(batch) => batch,
                Err(e) => {
                    consecutive_failures += 1;
                    summary.failed_pages += 1;
                    warn!(error = %e, consecutive_failures, "discovery call failed");

                    let unreachable_at_start = good_batches == 0
                        && matches!(e, LeizillaError::SourceUnreachable { .. });
                    if unreachable_at_start
                        || consecutive_failures >= self.config.max_consecutive_failures
                    {
                        return Err(self.fail(&mut state, summary.marker.clone(), started, e).await);
                    }
                    continue;
                }
            };

            start = None;
            pages_used += batch.pages_visited + batch.failed_pages;
            summary.pages_visited += batch.pages_visited;
            summary.failed_pages += batch.failed_pages;
            summary.skipped += u64::from(batch.skipped_records);
            summary.discovered += batch.records.len() as u64;

            if batch.all_failed() {
                consecutive_failures += 1;
                warn!(
                    failed_pages = batch.failed_pages,
                    consecutive_failures, "every page in batch failed"
                );
            } else {
                consecutive_failures = 0;
                good_batches += 1;
            }

            progress.phase(CrawlPhase::Persisting.as_str());
            for law in &batch.records {
                self.storage.upsert_law(law).await?;
                summary.persisted += 1;
            }
            if let Some(marker) = batch.next_marker {
                summary.marker = Some(marker);
            }
            state.resume_marker = summary.marker.clone();
            self.storage.save_crawl_state(&state).await?;
            progress.batch_persisted(summary.persisted, summary.marker.as_deref());

            if consecutive_failures >= self.config.max_consecutive_failures {
                let err = LeizillaError::unreachable(
                    &origin,
                    format!("{consecutive_failures} consecutive batches failed"),
                );
                return Err(self.fail(&mut state, summary.marker.clone(), started, err).await);
            }
            if batch.exhausted || batch.pages_visited + batch.failed_pages == 0 {
                info!(marker = ?summary.marker, "source exhausted");
                break CrawlPhase::Done;
            }
        };

        summary.elapsed = started.elapsed();
        state.status = summary.phase.as_str().to_string();
        if summary.phase == CrawlPhase::Done {
            state.last_successful_run_at = Some(Utc::now());
            state.last_items_discovered = summary.discovered;
        }
        self.storage.save_crawl_state(&state).await?;

        info!(
            phase = %summary.phase,
            discovered = summary.discovered,
            persisted = summary.persisted,
            failed_pages = summary.failed_pages,
            marker = ?summary.marker,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "crawl finished"
        );
        Ok(summary)
    }

    /// Record the failure in the crawl state and hand back the error.
    async fn fail(
        &self,
        state: &mut CrawlState,
        marker: Option<String>,
        started: Instant,
        err: LeizillaError,
    ) -> LeizillaError {
        warn!(
            error = %err,
            marker = ?marker,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "crawl failed"
        );
        state.status = CrawlPhase::Failed.as_str().to_string();
        state.resume_marker = marker;
        state.last_error = Some(err.to_string());
        if let Err(save_err) = self.storage.save_crawl_state(state).await {
            warn!(error = %save_err, "could not record crawl failure");
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;
    use std::sync::Arc;

    use crate::test_support::{FakeConnector, FakePortal, crawl_config, temp_storage};
    use leizilla_connectors::RondoniaConnector;
    use leizilla_shared::LawFilter;

    #[tokio::test]
    async fn two_pages_yield_three_distinct_records() {
        let (storage, path) = temp_storage().await;
        let connector = FakeConnector::with_pages(vec![2, 1]);

        let summary = Orchestrator::new(&storage, crawl_config(10, 10), CancelFlag::new())
            .run(&connector, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.phase, CrawlPhase::Done);
        assert!(summary.phase.is_terminal());
        assert_eq!(summary.persisted, 3);
        let laws = storage.query_laws(&LawFilter::for_origin("fake")).await.unwrap();
        let mut ids: Vec<_> = laws.iter().map(|l| l.id.clone()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 3);

        let state = storage.get_crawl_state("fake").await.unwrap().unwrap();
        assert_eq!(state.status, "done");
        assert_eq!(state.resume_marker.as_deref(), Some("2"));
        assert_eq!(state.last_items_discovered, 3);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn second_run_resumes_after_marker() {
        let (storage, path) = temp_storage().await;
        let connector = FakeConnector::with_pages(vec![1, 1, 1, 1]);

        let first = Orchestrator::new(&storage, crawl_config(1, 2), CancelFlag::new())
            .run(&connector, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(first.persisted, 2);
        assert_eq!(first.marker.as_deref(), Some("2"));

        let second = Orchestrator::new(&storage, crawl_config(1, 10), CancelFlag::new())
            .run(&connector, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(second.persisted, 2);
        assert_eq!(second.phase, CrawlPhase::Done);

        let visited = connector.visited_pages();
        let mut unique = visited.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(visited.len(), unique.len(), "pages reprocessed: {visited:?}");
        assert_eq!(storage.stats().await.unwrap().total, 4);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn terminates_at_max_pages_on_endless_source() {
        let (storage, path) = temp_storage().await;
        let connector = FakeConnector::endless();

        let summary = Orchestrator::new(&storage, crawl_config(2, 5), CancelFlag::new())
            .run(&connector, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.phase, CrawlPhase::Done);
        assert_eq!(summary.pages_visited, 5);
        assert_eq!(summary.batches, 3);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn consecutive_failures_fail_and_keep_marker() {
        let (storage, path) = temp_storage().await;
        let connector = FakeConnector::with_pages(vec![1, 1, 1, 1]).failing_after(1);

        let err = Orchestrator::new(&storage, crawl_config(1, 10), CancelFlag::new())
            .run(&connector, &SilentProgress)
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "got {err:?}");
        assert_eq!(connector.discover_calls(), 4);

        let state = storage.get_crawl_state("fake").await.unwrap().unwrap();
        assert_eq!(state.status, "failed");
        assert_eq!(state.resume_marker.as_deref(), Some("1"));
        assert!(state.last_error.is_some());
        assert!(storage.get_law("fake-lei-2024-1-0").await.unwrap().is_some());
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn unreachable_source_fails_immediately() {
        let (storage, path) = temp_storage().await;
        let connector = FakeConnector::unreachable();

        let err = Orchestrator::new(&storage, crawl_config(1, 10), CancelFlag::new())
            .run(&connector, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, LeizillaError::SourceUnreachable { .. }));
        assert_eq!(connector.discover_calls(), 1);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn cancelled_before_first_batch() {
        let (storage, path) = temp_storage().await;
        let connector = FakeConnector::with_pages(vec![1, 1]);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let summary = Orchestrator::new(&storage, crawl_config(1, 10), cancel)
            .run(&connector, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.phase, CrawlPhase::Cancelled);
        assert_eq!(connector.discover_calls(), 0);
        assert_eq!(
            storage.get_crawl_state("fake").await.unwrap().unwrap().status,
            "cancelled"
        );
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn cancel_mid_run_keeps_persisted_marker() {
        let (storage, path) = temp_storage().await;
        let cancel = CancelFlag::new();
        let connector = FakeConnector::with_pages(vec![1, 1, 1]).cancel_on_first_call(cancel.clone());

        let summary = Orchestrator::new(&storage, crawl_config(1, 10), cancel)
            .run(&connector, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.phase, CrawlPhase::Cancelled);
        assert_eq!(summary.persisted, 1);
        let state = storage.get_crawl_state("fake").await.unwrap().unwrap();
        assert_eq!(state.resume_marker.as_deref(), Some("1"));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn explicit_start_overrides_marker() {
        let (storage, path) = temp_storage().await;
        let connector = FakeConnector::with_pages(vec![1, 1, 1, 1]);
        let mut config = crawl_config(10, 10);
        config.start = Some(3);

        let summary = Orchestrator::new(&storage, config, CancelFlag::new())
            .run(&connector, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.persisted, 2);
        assert_eq!(connector.visited_pages(), vec![3, 4]);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn exhausted_frontier_is_revisited_on_next_run() {
        let (storage, path) = temp_storage().await;
        let portal = Arc::new(FakePortal::default());
        portal.publish(1, 100);
        let connector =
            RondoniaConnector::new("http://portal.test", portal.clone(), Duration::ZERO).unwrap();
        let mut config = crawl_config(10, 50);
        config.max_empty_pages = 2;

        let first = Orchestrator::new(&storage, config.clone(), CancelFlag::new())
            .run(&connector, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(first.phase, CrawlPhase::Done);
        assert_eq!(first.persisted, 1);
        assert_eq!(first.marker.as_deref(), Some("1"));

        // The next coddoc is only published after the first run.
        portal.publish(2, 101);
        let second = Orchestrator::new(&storage, config, CancelFlag::new())
            .run(&connector, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(second.persisted, 1);
        assert_eq!(second.marker.as_deref(), Some("2"));
        assert!(storage.get_law("rondonia-lei-2020-101").await.unwrap().is_some());
        let state = storage.get_crawl_state("rondonia").await.unwrap().unwrap();
        assert_eq!(state.resume_marker.as_deref(), Some("2"));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn unreachable_page_after_marker_fails_until_start_skips_it() {
        let (storage, path) = temp_storage().await;
        let first = Orchestrator::new(&storage, crawl_config(10, 10), CancelFlag::new())
            .run(&FakeConnector::with_pages(vec![1, 1]), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(first.marker.as_deref(), Some("2"));

        // Page 3 is permanently broken: every resumed run fails on it.
        for _ in 0..2 {
            let broken = FakeConnector::with_pages(vec![1, 1, 1, 1]).unreachable_after(2);
            let err = Orchestrator::new(&storage, crawl_config(10, 10), CancelFlag::new())
                .run(&broken, &SilentProgress)
                .await
                .unwrap_err();
            assert!(matches!(err, LeizillaError::SourceUnreachable { .. }));
            assert_eq!(broken.discover_calls(), 1);
            let state = storage.get_crawl_state("fake").await.unwrap().unwrap();
            assert_eq!(state.status, "failed");
            assert_eq!(state.resume_marker.as_deref(), Some("2"));
            assert!(state.last_error.unwrap().contains("page 3"));
        }

        // An explicit start past the broken page resumes the crawl.
        let mut config = crawl_config(10, 10);
        config.start = Some(4);
        let skipped = FakeConnector::with_pages(vec![1, 1, 1, 1]);
        let summary = Orchestrator::new(&storage, config, CancelFlag::new())
            .run(&skipped, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.phase, CrawlPhase::Done);
        assert_eq!(skipped.visited_pages(), vec![4]);
        assert_eq!(summary.marker.as_deref(), Some("4"));
        let _ = std::fs::remove_file(path);
    }
}
