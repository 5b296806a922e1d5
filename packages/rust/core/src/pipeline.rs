//! Post-discovery stages: download → archive → OCR text → export.
//!
//! Each stage pulls its work queue from storage, so stages can run
//! independently from the CLI or chained by [`Pipeline::run`]. All
//! persistence happens on the calling task; only downloads fan out.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use leizilla_connectors::Connector;
use leizilla_publisher::{ExportOutcome, Publisher, ocr_url_for};
use leizilla_shared::{
    CrawlConfig, ExportFormat, LawRecord, LeizillaError, ProcessingStage, Result, TextConfig,
    content_hash,
};
use leizilla_storage::Storage;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::crawl::{CancelFlag, CrawlPhase, CrawlSummary, Orchestrator};
use crate::progress::ProgressReporter;

/// Counts for one stage run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Counts for a full pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub crawl: CrawlSummary,
    pub download: StageSummary,
    pub archive: StageSummary,
    pub text: StageSummary,
    pub export: Option<ExportOutcome>,
}

impl PipelineSummary {
    pub fn discovered(&self) -> u64 {
        self.crawl.discovered
    }

    pub fn downloaded(&self) -> usize {
        self.download.succeeded
    }

    pub fn archived(&self) -> usize {
        self.archive.succeeded
    }

    pub fn failed(&self) -> usize {
        self.crawl.failed_pages as usize + self.download.failed + self.archive.failed + self.text.failed
    }

    pub fn skipped(&self) -> usize {
        self.crawl.skipped as usize + self.download.skipped + self.archive.skipped + self.text.skipped
    }
}

/// Options for [`Pipeline::run`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Per-stage item limit.
    pub limit: u32,
    pub archive: bool,
    pub fetch_text: bool,
    pub export: Option<ExportFormat>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            archive: true,
            fetch_text: true,
            export: Some(ExportFormat::Parquet),
        }
    }
}

enum DownloadOutcome {
    Fetched { path: PathBuf, hash: String },
    Failed,
    Cancelled,
}

/// Shared context of the post-discovery stages.
pub struct Pipeline<'a> {
    storage: &'a Storage,
    publisher: &'a Publisher,
    downloads_dir: PathBuf,
    text: TextConfig,
    cancel: CancelFlag,
    progress: &'a dyn ProgressReporter,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        storage: &'a Storage,
        publisher: &'a Publisher,
        downloads_dir: impl Into<PathBuf>,
        text: TextConfig,
        cancel: CancelFlag,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            storage,
            publisher,
            downloads_dir: downloads_dir.into(),
            text,
            cancel,
            progress,
        }
    }

    /// `{downloads_dir}/{origin}/{id}.pdf`
    pub fn pdf_path(&self, law: &LawRecord) -> PathBuf {
        self.downloads_dir
            .join(&law.origin)
            .join(format!("{}.pdf", law.id))
    }

    // -----------------------------------------------------------------------
    // Download
    // -----------------------------------------------------------------------

    /// Download PDFs of discovered laws, `concurrency` at a time.
    #[instrument(skip(self, connector), fields(origin = connector.origin()))]
    pub async fn download_pending(
        &self,
        connector: Arc<dyn Connector>,
        limit: u32,
        concurrency: usize,
    ) -> Result<StageSummary> {
        self.progress.phase("download");
        let pending = self
            .storage
            .pending_downloads(Some(connector.origin()), limit)
            .await?;
        let total = pending.len();
        info!(total, "downloads pending");

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut handles = Vec::with_capacity(total);
        for law in pending {
            let connector = Arc::clone(&connector);
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();
            let path = self.pdf_path(&law);

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (law, DownloadOutcome::Cancelled);
                };
                if cancel.is_cancelled() {
                    return (law, DownloadOutcome::Cancelled);
                }
                if !connector.download(&law, &path).await {
                    return (law, DownloadOutcome::Failed);
                }
                match tokio::fs::read(&path).await {
                    Ok(bytes) => {
                        let hash = content_hash(&bytes);
                        (law, DownloadOutcome::Fetched { path, hash })
                    }
                    Err(e) => {
                        warn!(id = %law.id, error = %e, "downloaded file unreadable");
                        (law, DownloadOutcome::Failed)
                    }
                }
            }));
        }

        let mut summary = StageSummary::default();
        for (i, handle) in handles.into_iter().enumerate() {
            let (law, outcome) = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "download task failed");
                    summary.processed += 1;
                    summary.failed += 1;
                    continue;
                }
            };

            match outcome {
                DownloadOutcome::Cancelled => {
                    summary.skipped += 1;
                    continue;
                }
                DownloadOutcome::Failed => {
                    summary.processed += 1;
                    summary.failed += 1;
                }
                DownloadOutcome::Fetched { path, hash } => {
                    summary.processed += 1;
                    if self.record_download(&law, &path, hash).await? {
                        summary.succeeded += 1;
                    } else {
                        summary.skipped += 1;
                    }
                }
            }
            self.progress.item_done(&law.id, i + 1, total);
        }

        info!(?summary, "download stage finished");
        Ok(summary)
    }

    /// Persist a finished download. Returns `false` when the content was
    /// already stored under another law.
    async fn record_download(&self, law: &LawRecord, path: &Path, hash: String) -> Result<bool> {
        let mut patch = law.patch();
        patch.stage = ProcessingStage::Downloaded;

        if let Some(original) = self
            .storage
            .find_id_by_hash(&hash)
            .await?
            .filter(|id| id != &law.id)
        {
            info!(id = %law.id, duplicate_of = %original, "duplicate PDF content, discarding file");
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "could not remove duplicate file");
            }
            patch.collection_metadata = Some(serde_json::json!({
                "duplicate_of": original,
                "duplicate_hash": hash,
            }));
            self.storage.upsert_law(&patch).await?;
            return Ok(false);
        }

        patch.local_pdf_path = Some(path.display().to_string());
        patch.content_hash = Some(hash);
        self.storage.upsert_law(&patch).await?;
        debug!(id = %law.id, "download recorded");
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Archive
    // -----------------------------------------------------------------------

    /// Upload downloaded PDFs to the archive, one at a time.
    #[instrument(skip(self))]
    pub async fn archive_pending(&self, origin: &str, limit: u32) -> Result<StageSummary> {
        self.progress.phase("archive");
        let pending = self.storage.pending_archival(Some(origin), limit).await?;
        let total = pending.len();
        info!(total, "uploads pending");

        let mut summary = StageSummary::default();
        for (i, law) in pending.iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.skipped += total - i;
                break;
            }
            summary.processed += 1;

            let Some(local) = law.local_pdf_path.as_deref() else {
                summary.skipped += 1;
                continue;
            };

            match self.publisher.archive(Path::new(local), law).await {
                Ok(item) => {
                    let mut patch = law.patch();
                    patch.archive_url = Some(item.download_url);
                    patch.archive_item_id = Some(item.identifier);
                    patch.stage = ProcessingStage::Archived;
                    patch.collection_metadata = Some(serde_json::json!({
                        "ia_details_url": item.details_url,
                        "ia_ocr_url": item.ocr_url,
                        "archived_at": Utc::now().to_rfc3339(),
                    }));
                    self.storage.upsert_law(&patch).await?;
                    summary.succeeded += 1;
                }
                // Missing credentials fail every upload the same way.
                Err(e @ LeizillaError::Config { .. }) => return Err(e),
                Err(e) => {
                    warn!(id = %law.id, error = %e, "archival failed");
                    summary.failed += 1;
                }
            }
            self.progress.item_done(&law.id, i + 1, total);
        }

        info!(?summary, "archive stage finished");
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // OCR text
    // -----------------------------------------------------------------------

    /// Fetch OCR text for archived laws within the configured attempt bound.
    #[instrument(skip(self))]
    pub async fn extract_text_pending(&self, origin: &str, limit: u32) -> Result<StageSummary> {
        self.progress.phase("text");
        let pending = self
            .storage
            .pending_text(Some(origin), limit, self.text.attempt_limit())
            .await?;
        let total = pending.len();
        info!(total, policy = ?self.text.missing_text_policy, "OCR texts pending");

        let service = self.publisher.service();
        let mut summary = StageSummary::default();
        for (i, law) in pending.iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.skipped += total - i;
                break;
            }
            summary.processed += 1;

            let ocr_url = law
                .collection_metadata
                .as_ref()
                .and_then(|m| m.get("ia_ocr_url"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .or_else(|| law.archive_url.as_deref().map(ocr_url_for));
            let Some(ocr_url) = ocr_url else {
                summary.skipped += 1;
                continue;
            };

            let fetched = service.fetch_text(&ocr_url).await;
            // Transient failures say nothing about the item and do not count.
            if !fetched.as_ref().is_err_and(LeizillaError::is_retryable) {
                self.storage.record_text_attempt(&law.id).await?;
            }
            match fetched {
                Ok(Some(text)) => {
                    let mut patch = law.patch();
                    patch.full_text = Some(text);
                    patch.stage = ProcessingStage::TextExtracted;
                    self.storage.upsert_law(&patch).await?;
                    summary.succeeded += 1;
                }
                Ok(None) => {
                    debug!(id = %law.id, attempts = law.text_attempts + 1, "OCR text not ready");
                    summary.skipped += 1;
                }
                Err(e) => {
                    warn!(id = %law.id, error = %e, "OCR text fetch failed");
                    summary.failed += 1;
                }
            }
            self.progress.item_done(&law.id, i + 1, total);
        }

        info!(?summary, "text stage finished");
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Full run
    // -----------------------------------------------------------------------

    /// Discover, download, archive, fetch text and export one origin.
    ///
    /// Stops after the crawl if it was cancelled.
    #[instrument(skip_all, fields(origin = connector.origin()))]
    pub async fn run(
        &self,
        connector: Arc<dyn Connector>,
        crawl: CrawlConfig,
        options: &PipelineOptions,
    ) -> Result<PipelineSummary> {
        let started = Instant::now();
        let origin = connector.origin().to_string();
        let concurrency = crawl.download_concurrency;

        let crawl_summary = Orchestrator::new(self.storage, crawl, self.cancel.clone())
            .run(connector.as_ref(), self.progress)
            .await?;

        let mut summary = PipelineSummary {
            crawl: crawl_summary,
            download: StageSummary::default(),
            archive: StageSummary::default(),
            text: StageSummary::default(),
            export: None,
        };
        if summary.crawl.phase == CrawlPhase::Cancelled {
            return Ok(summary);
        }

        summary.download = self
            .download_pending(Arc::clone(&connector), options.limit, concurrency)
            .await?;
        if options.archive && !self.cancel.is_cancelled() {
            summary.archive = self.archive_pending(&origin, options.limit).await?;
        }
        if options.fetch_text && !self.cancel.is_cancelled() {
            summary.text = self.extract_text_pending(&origin, options.limit).await?;
        }
        if let Some(format) = options.export.filter(|_| !self.cancel.is_cancelled()) {
            self.progress.phase("export");
            summary.export = Some(
                self.publisher
                    .export_dataset(self.storage, &origin, None, format)
                    .await?,
            );
        }

        info!(
            discovered = summary.discovered(),
            downloaded = summary.downloaded(),
            archived = summary.archived(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;
    use crate::test_support::{FakeArchive, FakeConnector, crawl_config, fake_law, temp_dir, temp_storage};
    use leizilla_shared::{ArchiveConfig, LawFilter, TextPolicy};
    use std::sync::atomic::Ordering;

    fn publisher(archive: Arc<FakeArchive>, dir: &Path) -> Publisher {
        Publisher::new(archive, ArchiveConfig::default(), dir.join("exports"))
    }

    async fn seed(storage: &Storage, laws: &[LawRecord]) {
        for law in laws {
            storage.upsert_law(law).await.unwrap();
        }
    }

    #[tokio::test]
    async fn downloads_dedup_by_content_hash() {
        let (storage, db) = temp_storage().await;
        let dir = temp_dir();
        let (a, b, c) = (fake_law(1, 0), fake_law(1, 1), fake_law(1, 2));
        seed(&storage, &[a.clone(), b.clone(), c.clone()]).await;

        // a and b serve identical bytes; c has no PDF.
        let connector: Arc<dyn Connector> = Arc::new(
            FakeConnector::with_pages(vec![])
                .with_pdf(&a.id, b"%PDF same")
                .with_pdf(&b.id, b"%PDF same"),
        );
        let publisher = publisher(Arc::new(FakeArchive::default()), &dir);
        let pipeline = Pipeline::new(
            &storage,
            &publisher,
            dir.join("downloads"),
            TextConfig::default(),
            CancelFlag::new(),
            &SilentProgress,
        );

        let summary = pipeline.download_pending(connector, 10, 2).await.unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);

        let stored_a = storage.get_law(&a.id).await.unwrap().unwrap();
        assert_eq!(stored_a.stage, ProcessingStage::Downloaded);
        assert_eq!(stored_a.content_hash.as_deref(), Some(content_hash(b"%PDF same").as_str()));
        assert!(Path::new(stored_a.local_pdf_path.as_deref().unwrap()).is_file());

        let stored_b = storage.get_law(&b.id).await.unwrap().unwrap();
        assert!(stored_b.local_pdf_path.is_none());
        assert_eq!(stored_b.collection_metadata.unwrap()["duplicate_of"], a.id.as_str());
        assert!(!pipeline.pdf_path(&b).exists());

        let stored_c = storage.get_law(&c.id).await.unwrap().unwrap();
        assert_eq!(stored_c.stage, ProcessingStage::Discovered);

        // The failed download stays queued; nothing else does.
        let again = storage.pending_downloads(Some("fake"), 10).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, c.id);

        let _ = std::fs::remove_dir_all(&dir);
        let _ = std::fs::remove_file(db);
    }

    #[tokio::test]
    async fn cancelled_downloads_are_skipped() {
        let (storage, db) = temp_storage().await;
        let dir = temp_dir();
        let law = fake_law(1, 0);
        seed(&storage, &[law.clone()]).await;

        let cancel = CancelFlag::new();
        cancel.cancel();
        let connector: Arc<dyn Connector> =
            Arc::new(FakeConnector::with_pages(vec![]).with_pdf(&law.id, b"%PDF"));
        let publisher = publisher(Arc::new(FakeArchive::default()), &dir);
        let pipeline = Pipeline::new(&storage, &publisher, dir.join("downloads"), TextConfig::default(), cancel, &SilentProgress);

        let summary = pipeline.download_pending(connector, 10, 1).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.processed, 0);
        assert!(!pipeline.pdf_path(&law).exists());
        let _ = std::fs::remove_file(db);
    }

    async fn downloaded(storage: &Storage, dir: &Path, law: &LawRecord) {
        let path = dir.join(format!("{}.pdf", law.id));
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(&path, law.id.as_bytes()).unwrap();
        let mut patch = law.clone();
        patch.local_pdf_path = Some(path.display().to_string());
        patch.content_hash = Some(content_hash(law.id.as_bytes()));
        patch.stage = ProcessingStage::Downloaded;
        storage.upsert_law(&patch).await.unwrap();
    }

    #[tokio::test]
    async fn archive_marks_success_and_counts_failures() {
        let (storage, db) = temp_storage().await;
        let dir = temp_dir();
        let (ok, bad) = (fake_law(2, 0), fake_law(2, 1));
        downloaded(&storage, &dir, &ok).await;
        downloaded(&storage, &dir, &bad).await;

        let archive = Arc::new(FakeArchive::default().rejecting(&bad.id));
        let publisher = publisher(Arc::clone(&archive), &dir);
        let pipeline = Pipeline::new(&storage, &publisher, dir.join("downloads"), TextConfig::default(), CancelFlag::new(), &SilentProgress);

        let summary = pipeline.archive_pending("fake", 10).await.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);

        let stored = storage.get_law(&ok.id).await.unwrap().unwrap();
        assert_eq!(stored.stage, ProcessingStage::Archived);
        assert_eq!(stored.archive_item_id.as_deref(), Some("leizilla-fake-lei-2024-2-0"));
        assert!(stored.collection_metadata.unwrap()["ia_ocr_url"].as_str().unwrap().ends_with("_djvu.txt"));

        // Only the failed upload is left, and it is not retried on its own.
        let left = storage.pending_archival(Some("fake"), 10).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, bad.id);

        let _ = std::fs::remove_dir_all(&dir);
        let _ = std::fs::remove_file(db);
    }

    async fn archived(storage: &Storage, dir: &Path, law: &LawRecord) {
        downloaded(storage, dir, law).await;
        let identifier = leizilla_publisher::law_identifier(law);
        let mut patch = law.patch();
        patch.archive_item_id = Some(identifier.clone());
        patch.archive_url = Some(format!("https://archive.test/download/{identifier}/{identifier}.pdf"));
        patch.stage = ProcessingStage::Archived;
        storage.upsert_law(&patch).await.unwrap();
    }

    async fn run_text_stage(storage: &Storage, archive: &Arc<FakeArchive>, text: &TextConfig, dir: &Path) -> StageSummary {
        let publisher = publisher(Arc::clone(archive), dir);
        Pipeline::new(storage, &publisher, dir.join("downloads"), text.clone(), CancelFlag::new(), &SilentProgress)
            .extract_text_pending("fake", 10)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn text_stage_stores_ready_text() {
        let (storage, db) = temp_storage().await;
        let dir = temp_dir();
        let law = fake_law(3, 0);
        archived(&storage, &dir, &law).await;

        let archive = Arc::new(FakeArchive::default().with_text(&leizilla_publisher::law_identifier(&law), "Art. 1º FICA CRIADO"));
        let summary = run_text_stage(&storage, &archive, &TextConfig::default(), &dir).await;
        assert_eq!(summary.succeeded, 1);

        let stored = storage.get_law(&law.id).await.unwrap().unwrap();
        assert_eq!(stored.stage, ProcessingStage::TextExtracted);
        assert_eq!(stored.full_text.as_deref(), Some("Art. 1º FICA CRIADO"));
        assert_eq!(stored.normalized_text.as_deref(), Some("art. 1o fica criado"));

        let hits = storage
            .query_laws(&LawFilter {
                text: Some("FICA CRIADO".into()),
                ..LawFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
        let _ = std::fs::remove_file(db);
    }

    #[tokio::test]
    async fn keep_policy_asks_once() {
        let (storage, db) = temp_storage().await;
        let dir = temp_dir();
        archived(&storage, &dir, &fake_law(4, 0)).await;
        let archive = Arc::new(FakeArchive::default());

        for _ in 0..3 {
            run_text_stage(&storage, &archive, &TextConfig::default(), &dir).await;
        }
        assert_eq!(archive.text_requests.load(Ordering::SeqCst), 1);
        let stored = storage.get_law("fake-lei-2024-4-0").await.unwrap().unwrap();
        assert!(stored.full_text.is_none());
        assert_eq!(stored.stage, ProcessingStage::Archived);
        let _ = std::fs::remove_dir_all(&dir);
        let _ = std::fs::remove_file(db);
    }

    #[tokio::test]
    async fn transient_text_error_does_not_use_up_keep_attempt() {
        let (storage, db) = temp_storage().await;
        let dir = temp_dir();
        let law = fake_law(6, 0);
        archived(&storage, &dir, &law).await;
        let archive = Arc::new(
            FakeArchive::default()
                .with_text(&leizilla_publisher::law_identifier(&law), "Art. 2º Revoga-se")
                .with_transient_text_errors(1),
        );

        let first = run_text_stage(&storage, &archive, &TextConfig::default(), &dir).await;
        assert_eq!(first.failed, 1);
        assert_eq!(storage.get_law(&law.id).await.unwrap().unwrap().text_attempts, 0);

        let second = run_text_stage(&storage, &archive, &TextConfig::default(), &dir).await;
        assert_eq!(second.succeeded, 1);
        assert_eq!(archive.text_requests.load(Ordering::SeqCst), 2);
        let stored = storage.get_law(&law.id).await.unwrap().unwrap();
        assert_eq!(stored.full_text.as_deref(), Some("Art. 2º Revoga-se"));
        assert_eq!(stored.text_attempts, 1);
        let _ = std::fs::remove_dir_all(&dir);
        let _ = std::fs::remove_file(db);
    }

    #[tokio::test]
    async fn retry_policy_stops_at_max_attempts() {
        let (storage, db) = temp_storage().await;
        let dir = temp_dir();
        archived(&storage, &dir, &fake_law(5, 0)).await;
        let archive = Arc::new(FakeArchive::default());
        let text = TextConfig {
            missing_text_policy: TextPolicy::Retry,
            max_text_attempts: 3,
        };

        for _ in 0..5 {
            run_text_stage(&storage, &archive, &text, &dir).await;
        }
        assert_eq!(archive.text_requests.load(Ordering::SeqCst), 3);
        assert_eq!(
            storage.get_law("fake-lei-2024-5-0").await.unwrap().unwrap().text_attempts,
            3
        );
        let _ = std::fs::remove_dir_all(&dir);
        let _ = std::fs::remove_file(db);
    }

    #[tokio::test]
    async fn full_pipeline_run() {
        let (storage, db) = temp_storage().await;
        let dir = temp_dir();
        let first = fake_law(1, 0);
        let second = fake_law(1, 1);
        let connector: Arc<dyn Connector> = Arc::new(
            FakeConnector::with_pages(vec![2])
                .with_pdf(&first.id, b"%PDF one")
                .with_pdf(&second.id, b"%PDF two"),
        );
        let archive = Arc::new(
            FakeArchive::default().with_text(&leizilla_publisher::law_identifier(&first), "texto da lei"),
        );
        let publisher = publisher(Arc::clone(&archive), &dir);
        let pipeline = Pipeline::new(&storage, &publisher, dir.join("downloads"), TextConfig::default(), CancelFlag::new(), &SilentProgress);

        let options = PipelineOptions {
            export: Some(ExportFormat::Jsonl),
            ..PipelineOptions::default()
        };
        let summary = pipeline.run(connector, crawl_config(5, 5), &options).await.unwrap();

        assert_eq!(summary.discovered(), 2);
        assert_eq!(summary.downloaded(), 2);
        assert_eq!(summary.archived(), 2);
        assert_eq!(summary.text.succeeded, 1);
        assert_eq!(summary.failed(), 0);

        let export = summary.export.unwrap();
        assert_eq!(export.rows, 2);
        assert!(export.path.ends_with("leis_fake_completo.jsonl"));

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.with_text, 1);
        let _ = std::fs::remove_dir_all(&dir);
        let _ = std::fs::remove_file(db);
    }
}
