//! In-memory fakes shared by the crawl and pipeline tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use leizilla_connectors::{
    Connector, DiscoverParams, DiscoveryBatch, FetchedBinary, PageFetcher, write_atomic,
};
use leizilla_publisher::{ArchiveService, ArchivedItem, UploadRequest};
use leizilla_shared::{CrawlConfig, LawRecord, LeizillaError, Result};
use leizilla_storage::Storage;
use uuid::Uuid;

use crate::crawl::CancelFlag;

pub async fn temp_storage() -> (Storage, PathBuf) {
    let path = std::env::temp_dir().join(format!("lz_test_{}.db", Uuid::now_v7()));
    let storage = Storage::open(&path).await.expect("open temp storage");
    (storage, path)
}

pub fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("lz_core_{}", Uuid::now_v7()))
}

pub fn crawl_config(pages_per_batch: u32, max_pages: u32) -> CrawlConfig {
    CrawlConfig {
        rate_limit_ms: 0,
        pages_per_batch,
        max_pages,
        max_empty_pages: 0,
        max_consecutive_failures: 3,
        download_concurrency: 2,
        start: None,
        end: None,
    }
}

// ---------------------------------------------------------------------------
// FakeConnector
// ---------------------------------------------------------------------------

enum Failure {
    None,
    AfterPage(u64),
    UnreachableAfter(u64),
    Unreachable,
}

/// Paged source where page `n` holds `pages[n - 1]` laws with ids
/// `fake-lei-2024-{n}-{i}`.
pub struct FakeConnector {
    pages: Option<Vec<usize>>,
    failure: Failure,
    cancel_on_first_call: Option<CancelFlag>,
    pdfs: HashMap<String, Vec<u8>>,
    visited: Mutex<Vec<u64>>,
    calls: AtomicU32,
}

impl FakeConnector {
    pub fn with_pages(pages: Vec<usize>) -> Self {
        Self {
            pages: Some(pages),
            failure: Failure::None,
            cancel_on_first_call: None,
            pdfs: HashMap::new(),
            visited: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// One law per page, forever.
    pub fn endless() -> Self {
        Self {
            pages: None,
            ..Self::with_pages(Vec::new())
        }
    }

    pub fn unreachable() -> Self {
        Self {
            failure: Failure::Unreachable,
            ..Self::with_pages(Vec::new())
        }
    }

    /// Discovery fails for any window starting after `page`.
    pub fn failing_after(mut self, page: u64) -> Self {
        self.failure = Failure::AfterPage(page);
        self
    }

    /// The first page of any window starting after `page` cannot be fetched.
    pub fn unreachable_after(mut self, page: u64) -> Self {
        self.failure = Failure::UnreachableAfter(page);
        self
    }

    pub fn cancel_on_first_call(mut self, cancel: CancelFlag) -> Self {
        self.cancel_on_first_call = Some(cancel);
        self
    }

    /// Bytes served when `id` is downloaded. Laws without an entry fail.
    pub fn with_pdf(mut self, id: &str, bytes: &[u8]) -> Self {
        self.pdfs.insert(id.to_string(), bytes.to_vec());
        self
    }

    pub fn visited_pages(&self) -> Vec<u64> {
        self.visited.lock().unwrap().clone()
    }

    pub fn discover_calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn page_size(&self, page: u64) -> Option<usize> {
        match &self.pages {
            Some(pages) => pages.get(page as usize - 1).copied(),
            None => Some(1),
        }
    }
}

pub fn fake_law(page: u64, i: usize) -> LawRecord {
    let id = format!("fake-lei-2024-{page}-{i}");
    let mut law = LawRecord::new(&id, format!("LEI Nº {page}.{i}, DE 2 DE JANEIRO DE 2024"), "fake");
    law.law_type = Some("lei".into());
    law.number = Some(format!("{page}-{i}"));
    law.year = Some(2024);
    law.pdf_url = Some(format!("http://fake.test/{id}.pdf"));
    law
}

#[async_trait]
impl Connector for FakeConnector {
    fn origin(&self) -> &str {
        "fake"
    }

    async fn discover(&self, params: &DiscoverParams) -> Result<DiscoveryBatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(cancel) = &self.cancel_on_first_call {
            cancel.cancel();
        }

        let first = params
            .start
            .or_else(|| {
                params
                    .resume_marker
                    .as_deref()
                    .and_then(|m| m.parse::<u64>().ok())
                    .map(|m| m + 1)
            })
            .unwrap_or(1);

        match self.failure {
            Failure::Unreachable => {
                return Err(LeizillaError::unreachable("fake", "connection refused"));
            }
            Failure::UnreachableAfter(limit) if first > limit => {
                return Err(LeizillaError::unreachable("fake", format!("page {first}: HTTP 500")));
            }
            Failure::AfterPage(limit) if first > limit => {
                return Err(LeizillaError::TransientNetwork("fake: HTTP 503".into()));
            }
            _ => {}
        }

        let mut batch = DiscoveryBatch::default();
        let mut page = first;
        while batch.pages_visited < params.max_pages {
            let beyond_end = params.end.is_some_and(|end| page > end);
            let Some(size) = self.page_size(page).filter(|_| !beyond_end) else {
                batch.exhausted = true;
                break;
            };
            self.visited.lock().unwrap().push(page);
            batch.records.extend((0..size).map(|i| fake_law(page, i)));
            batch.pages_visited += 1;
            batch.next_marker = Some(page.to_string());
            page += 1;
        }
        Ok(batch)
    }

    async fn download(&self, law: &LawRecord, destination: &Path) -> bool {
        let Some(bytes) = self.pdfs.get(&law.id) else {
            return false;
        };
        write_atomic(destination, bytes).await.is_ok()
    }
}

// ---------------------------------------------------------------------------
// FakeArchive
// ---------------------------------------------------------------------------

/// Archive that accepts uploads except for rejected ids, and serves OCR
/// text only for ids registered as ready.
#[derive(Default)]
pub struct FakeArchive {
    reject: Vec<String>,
    texts: HashMap<String, String>,
    transient_text_errors: AtomicU32,
    pub uploads: Mutex<Vec<String>>,
    pub text_requests: AtomicU32,
}

impl FakeArchive {
    pub fn rejecting(mut self, id: &str) -> Self {
        self.reject.push(id.to_string());
        self
    }

    pub fn with_text(mut self, identifier: &str, text: &str) -> Self {
        self.texts.insert(identifier.to_string(), text.to_string());
        self
    }

    /// The next `n` text fetches time out.
    pub fn with_transient_text_errors(self, n: u32) -> Self {
        self.transient_text_errors.store(n, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl ArchiveService for FakeArchive {
    async fn upload(&self, _file: &Path, request: &UploadRequest) -> Result<ArchivedItem> {
        let law_id = request
            .metadata
            .iter()
            .find(|(k, _)| k == "leizilla-id")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        if self.reject.contains(&law_id) {
            return Err(LeizillaError::Archival(format!("{law_id}: HTTP 503")));
        }
        self.uploads.lock().unwrap().push(request.identifier.clone());
        let download_url = format!("https://archive.test/download/{0}/{0}.pdf", request.identifier);
        Ok(ArchivedItem {
            identifier: request.identifier.clone(),
            ocr_url: leizilla_publisher::ocr_url_for(&download_url),
            details_url: format!("https://archive.test/details/{}", request.identifier),
            download_url,
        })
    }

    async fn fetch_text(&self, ocr_url: &str) -> Result<Option<String>> {
        self.text_requests.fetch_add(1, Ordering::SeqCst);
        let transient = self
            .transient_text_errors
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err(LeizillaError::TransientNetwork(format!("{ocr_url}: timed out")));
        }
        Ok(self
            .texts
            .iter()
            .find(|(identifier, _)| ocr_url.contains(identifier.as_str()))
            .map(|(_, text)| text.clone()))
    }
}

// ---------------------------------------------------------------------------
// FakePortal
// ---------------------------------------------------------------------------

/// In-memory stand-in for the Rondônia portal, keyed by `coddoc`.
/// Unknown coddocs serve the portal's empty detail page.
#[derive(Default)]
pub struct FakePortal {
    pages: Mutex<HashMap<u64, String>>,
}

impl FakePortal {
    pub fn publish(&self, coddoc: u64, number: u32) {
        let html = format!(
            r#"<html><body><div id="container-main-offer">
                <h2>LEI Nº {number}, DE 2 DE JANEIRO DE 2020</h2>
                <a href="/docs/{number}.pdf">Baixar</a>
            </div></body></html>"#
        );
        self.pages.lock().unwrap().insert(coddoc, html);
    }
}

#[async_trait]
impl PageFetcher for FakePortal {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let coddoc = url
            .rsplit("coddoc=")
            .next()
            .and_then(|c| c.parse::<u64>().ok())
            .ok_or_else(|| LeizillaError::Network(format!("unexpected url {url}")))?;
        Ok(self.pages.lock().unwrap().get(&coddoc).cloned().unwrap_or_else(|| {
            r#"<html><body><div id="container-main-offer"></div></body></html>"#.to_string()
        }))
    }

    async fn fetch_binary(&self, url: &str) -> Result<FetchedBinary> {
        Err(LeizillaError::Network(format!("{url}: HTTP 404")))
    }
}
