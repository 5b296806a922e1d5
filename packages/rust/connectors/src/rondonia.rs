//! Rondônia state legislation (Casa Civil DITEL/COTEL portal).
//!
//! Each law has a detail page at
//! `{base}/COTEL/Livros/detalhes.aspx?coddoc={n}` with the title in
//! `#container-main-offer h2` and a link to the PDF. Documents are walked by
//! increasing `coddoc`; the resume marker is the last `coddoc` visited.

use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use leizilla_shared::{LawRecord, LeizillaError, Result, law_id, normalize_text};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::download::download_pdf;
use crate::fetcher::PageFetcher;
use crate::{Connector, DiscoverParams, DiscoveryBatch};

/// Declared source written into each record's collection metadata.
const SOURCE_LABEL: &str = "Ditel COTEL RO";

const DETAIL_PATH: &str = "/COTEL/Livros/detalhes.aspx";

static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#container-main-offer h2").expect("valid selector"));

static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// `LEI COMPLEMENTAR Nº 1.100, DE 27 DE DEZEMBRO DE 2023`
static FULL_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<kind>.*?)\s*N[º°o]?\.?\s*(?P<number>\d[\d.]*)[^\d]*?DE\s+(?P<day>\d{1,2})[º°o]?\s+DE\s+(?P<month>[A-ZÇÃÕÁÉÍÓÚÂÊÔ]+)\s+DE\s+(?P<year>\d{4})",
    )
    .expect("valid regex")
});

/// Fallback: number somewhere after `Nº`, year as the last 4-digit group.
static SHORT_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<kind>.*?)\s*N[º°o]?\.?\s*(?P<number>\d[\d.]*)\b.*\b(?P<year>\d{4})\b")
        .expect("valid regex")
});

// ---------------------------------------------------------------------------
// Title parsing
// ---------------------------------------------------------------------------

/// Fields recovered from a law title.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTitle {
    /// Kind as printed (`LEI COMPLEMENTAR`), if any.
    pub kind: Option<String>,
    pub number: String,
    pub year: i32,
    pub date: Option<NaiveDate>,
}

fn month_number(name: &str) -> Option<u32> {
    let month = match normalize_text(name).as_str() {
        "janeiro" => 1,
        "fevereiro" => 2,
        "marco" => 3,
        "abril" => 4,
        "maio" => 5,
        "junho" => 6,
        "julho" => 7,
        "agosto" => 8,
        "setembro" => 9,
        "outubro" => 10,
        "novembro" => 11,
        "dezembro" => 12,
        _ => return None,
    };
    Some(month)
}

fn clean_kind(raw: &str) -> Option<String> {
    let kind = raw.trim().trim_end_matches([',', '-', ':']).trim();
    if kind.is_empty() || kind.chars().any(|c| c.is_ascii_digit()) {
        None
    } else {
        Some(kind.to_string())
    }
}

/// Parse number, year, date and kind out of a portal title.
pub fn parse_title(title: &str) -> Option<ParsedTitle> {
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Some(caps) = FULL_TITLE_RE.captures(&title) {
        let year: i32 = caps["year"].parse().ok()?;
        let day: u32 = caps["day"].parse().ok()?;
        let date = month_number(&caps["month"]).and_then(|m| NaiveDate::from_ymd_opt(year, m, day));
        return Some(ParsedTitle {
            kind: clean_kind(&caps["kind"]),
            number: caps["number"].trim_end_matches('.').to_string(),
            year,
            date,
        });
    }

    let caps = SHORT_TITLE_RE.captures(&title)?;
    Some(ParsedTitle {
        kind: clean_kind(&caps["kind"]),
        number: caps["number"].trim_end_matches('.').to_string(),
        year: caps["year"].parse().ok()?,
        date: None,
    })
}

// ---------------------------------------------------------------------------
// Detail page parsing
// ---------------------------------------------------------------------------

/// What a single detail page yielded.
#[derive(Debug)]
pub enum PageOutcome {
    /// No law at this `coddoc`.
    Empty,
    Record(Box<LawRecord>),
    /// A law exists but a usable record could not be built.
    Malformed(String),
}

/// Build a record from the HTML of a detail page.
pub fn parse_detail_page(html: &str, page_url: &Url, coddoc: u64) -> PageOutcome {
    let doc = Html::parse_document(html);

    let title = doc
        .select(&TITLE_SEL)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty());

    let Some(title) = title else {
        return PageOutcome::Empty;
    };

    let pdf_url = doc
        .select(&LINK_SEL)
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .find(|href| href.to_ascii_lowercase().ends_with(".pdf"))
        .and_then(|href| page_url.join(href).ok());

    let Some(pdf_url) = pdf_url else {
        return PageOutcome::Malformed(format!("'{title}': no PDF link"));
    };

    let Some(parsed) = parse_title(&title) else {
        return PageOutcome::Malformed(format!("'{title}': number/year not found"));
    };

    let id = match law_id(
        RondoniaConnector::ORIGIN,
        parsed.kind.as_deref(),
        parsed.year,
        &parsed.number,
    ) {
        Ok(id) => id,
        Err(e) => return PageOutcome::Malformed(format!("'{title}': {e}")),
    };

    let mut law = LawRecord::new(id, title, RondoniaConnector::ORIGIN);
    law.law_type = Some(
        parsed
            .kind
            .as_deref()
            .map(leizilla_shared::slugify)
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| "lei".to_string()),
    );
    law.number = Some(parsed.number);
    law.year = Some(parsed.year);
    law.publication_date = parsed.date;
    law.original_url = Some(page_url.to_string());
    law.pdf_url = Some(pdf_url.to_string());
    law.collection_metadata = Some(serde_json::json!({
        "coddoc": coddoc,
        "fonte": SOURCE_LABEL,
        "discovered_at": Utc::now().to_rfc3339(),
        "status_coleta": "descoberto",
    }));

    PageOutcome::Record(Box::new(law))
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Connector for `ditel.casacivil.ro.gov.br`.
pub struct RondoniaConnector {
    base_url: Url,
    fetcher: Arc<dyn PageFetcher>,
    page_delay: Duration,
}

impl RondoniaConnector {
    pub const ORIGIN: &'static str = "rondonia";

    pub fn new(base_url: &str, fetcher: Arc<dyn PageFetcher>, page_delay: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| LeizillaError::config(format!("invalid Rondônia base_url '{base_url}': {e}")))?;
        Ok(Self {
            base_url,
            fetcher,
            page_delay,
        })
    }

    /// Detail page URL for a document id.
    pub fn page_url(&self, coddoc: u64) -> Result<Url> {
        let mut url = self
            .base_url
            .join(DETAIL_PATH)
            .map_err(|e| LeizillaError::config(format!("building detail URL: {e}")))?;
        url.query_pairs_mut()
            .clear()
            .append_pair("coddoc", &coddoc.to_string());
        Ok(url)
    }

    fn first_coddoc(params: &DiscoverParams) -> u64 {
        params
            .start
            .or_else(|| {
                params
                    .resume_marker
                    .as_deref()
                    .and_then(|m| m.parse::<u64>().ok())
                    .map(|m| m + 1)
            })
            .unwrap_or(1)
    }
}

#[async_trait]
impl Connector for RondoniaConnector {
    fn origin(&self) -> &str {
        Self::ORIGIN
    }

    #[instrument(skip_all, fields(origin = "rondonia", marker = ?params.resume_marker))]
    async fn discover(&self, params: &DiscoverParams) -> Result<DiscoveryBatch> {
        let mut batch = DiscoveryBatch::default();
        let mut coddoc = Self::first_coddoc(params);
        let mut empty_streak = 0u32;
        // Last coddoc that held something (a law, a malformed page or an error).
        let mut last_occupied: Option<u64> = None;

        while batch.pages_visited + batch.failed_pages < params.max_pages {
            if params.end.is_some_and(|end| coddoc > end) {
                batch.exhausted = true;
                break;
            }

            let first_page = batch.pages_visited + batch.failed_pages == 0;
            if !first_page && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let url = self.page_url(coddoc)?;
            match self.fetcher.fetch_text(url.as_str()).await {
                Err(e) if first_page => {
                    return Err(LeizillaError::unreachable(
                        Self::ORIGIN,
                        format!("coddoc {coddoc}: {e}"),
                    ));
                }
                Err(e) => {
                    warn!(coddoc, error = %e, "page fetch failed, continuing");
                    batch.failed_pages += 1;
                    last_occupied = Some(coddoc);
                }
                Ok(html) => {
                    batch.pages_visited += 1;
                    match parse_detail_page(&html, &url, coddoc) {
                        PageOutcome::Empty => {
                            debug!(coddoc, "empty page");
                            empty_streak += 1;
                        }
                        PageOutcome::Record(law) => {
                            debug!(coddoc, id = %law.id, "law discovered");
                            empty_streak = 0;
                            last_occupied = Some(coddoc);
                            batch.records.push(*law);
                        }
                        PageOutcome::Malformed(reason) => {
                            let err = LeizillaError::malformed(format!("coddoc={coddoc}"), reason);
                            warn!(error = %err, "skipping record");
                            empty_streak = 0;
                            last_occupied = Some(coddoc);
                            batch.skipped_records += 1;
                        }
                    }
                }
            }

            batch.next_marker = Some(coddoc.to_string());
            coddoc += 1;

            if params.max_empty_pages > 0 && empty_streak >= params.max_empty_pages {
                info!(coddoc, empty_streak, "no new documents, source exhausted");
                // Trailing empty coddocs may be filled by later publications,
                // so the marker stays on the last occupied one.
                batch.next_marker = last_occupied.map(|c| c.to_string());
                batch.exhausted = true;
                break;
            }
        }

        info!(
            records = batch.records.len(),
            visited = batch.pages_visited,
            failed = batch.failed_pages,
            skipped = batch.skipped_records,
            exhausted = batch.exhausted,
            "discovery batch finished"
        );
        Ok(batch)
    }

    async fn download(&self, law: &LawRecord, destination: &Path) -> bool {
        download_pdf(self.fetcher.as_ref(), law, destination).await
    }
}
