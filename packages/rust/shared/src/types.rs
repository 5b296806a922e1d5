//! Core domain types for Leizilla law records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LeizillaError;

// ---------------------------------------------------------------------------
// LawStatus / ProcessingStage
// ---------------------------------------------------------------------------

/// Legal status of a law. Transitions only move forward (see [`LawStatus::rank`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LawStatus {
    #[default]
    Active,
    Suspended,
    Revoked,
}

impl LawStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Revoked => "revoked",
        }
    }

    /// Position in the one-directional status order.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Suspended => 1,
            Self::Revoked => 2,
        }
    }
}

impl std::fmt::Display for LawStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LawStatus {
    type Err = LeizillaError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "revoked" => Ok(Self::Revoked),
            other => Err(LeizillaError::validation(format!("unknown law status '{other}'"))),
        }
    }
}

/// How far a record has progressed through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    #[default]
    Discovered,
    Downloaded,
    Archived,
    TextExtracted,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Downloaded => "downloaded",
            Self::Archived => "archived",
            Self::TextExtracted => "text_extracted",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Self::Discovered => 0,
            Self::Downloaded => 1,
            Self::Archived => 2,
            Self::TextExtracted => 3,
        }
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcessingStage {
    type Err = LeizillaError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "discovered" => Ok(Self::Discovered),
            "downloaded" => Ok(Self::Downloaded),
            "archived" => Ok(Self::Archived),
            "text_extracted" => Ok(Self::TextExtracted),
            other => Err(LeizillaError::validation(format!(
                "unknown processing stage '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// LawRecord
// ---------------------------------------------------------------------------

/// A single law as discovered, downloaded, archived and OCR'd.
///
/// Optional fields left as `None` are treated as "unchanged" by
/// `Storage::upsert_law`, so a record built at a later pipeline stage only
/// needs to carry what that stage learned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LawRecord {
    /// `{origin}-{type}-{year}-{number}`, slug-safe.
    pub id: String,
    pub title: String,
    /// Source tag, e.g. `rondonia`.
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub law_type: Option<String>,
    /// Number as printed on the document (`5.775`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<NaiveDate>,
    /// Portal page the record was discovered on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    /// Durable URL of the archived PDF.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_pdf_path: Option<String>,
    /// Free-form per-source metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_text: Option<String>,
    /// SHA-256 of the downloaded PDF bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub status: LawStatus,
    #[serde(default)]
    pub stage: ProcessingStage,
    /// OCR fetch attempts so far. Maintained by storage, ignored on upsert.
    #[serde(default)]
    pub text_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LawRecord {
    /// A freshly discovered record with only the required fields set.
    pub fn new(id: impl Into<String>, title: impl Into<String>, origin: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            origin: origin.into(),
            law_type: None,
            number: None,
            year: None,
            publication_date: None,
            original_url: None,
            pdf_url: None,
            archive_url: None,
            archive_item_id: None,
            local_pdf_path: None,
            collection_metadata: None,
            full_text: None,
            normalized_text: None,
            content_hash: None,
            status: LawStatus::Active,
            stage: ProcessingStage::Discovered,
            text_attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// A record carrying only identity fields, for partial updates.
    pub fn patch(&self) -> Self {
        Self::new(self.id.clone(), self.title.clone(), self.origin.clone())
    }
}

// ---------------------------------------------------------------------------
// Queries and export
// ---------------------------------------------------------------------------

/// Filters accepted by `Storage::query` and `Storage::export`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LawFilter {
    pub origin: Option<String>,
    pub year: Option<i32>,
    /// Inclusive lower bound on `publication_date`.
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on `publication_date`.
    pub date_to: Option<NaiveDate>,
    /// Substring matched against the normalized full text.
    pub text: Option<String>,
    pub stage: Option<ProcessingStage>,
    pub limit: Option<u32>,
}

impl LawFilter {
    pub fn for_origin(origin: impl Into<String>) -> Self {
        Self {
            origin: Some(origin.into()),
            ..Self::default()
        }
    }
}

/// Output format for dataset exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Parquet,
    Jsonl,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Jsonl => "jsonl",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = LeizillaError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parquet" => Ok(Self::Parquet),
            "jsonl" | "ndjson" => Ok(Self::Jsonl),
            other => Err(LeizillaError::validation(format!(
                "unsupported export format '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// CrawlState
// ---------------------------------------------------------------------------

/// Persisted per-origin crawl progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlState {
    pub origin: String,
    /// Opaque cursor; the connector decides what it means.
    pub resume_marker: Option<String>,
    /// Terminal state of the last run (`done`, `failed`, `cancelled`).
    pub status: String,
    pub last_successful_run_at: Option<DateTime<Utc>>,
    pub last_items_discovered: u64,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl CrawlState {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            resume_marker: None,
            status: "idle".into(),
            last_successful_run_at: None,
            last_items_discovered: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Aggregate counts reported by `Storage::stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageStats {
    pub total: u64,
    pub by_origin: Vec<(String, u64)>,
    /// Most recent years first.
    pub by_year: Vec<(i32, u64)>,
    pub by_stage: Vec<(String, u64)>,
    pub by_status: Vec<(String, u64)>,
    pub with_text: u64,
    pub crawl_states: Vec<CrawlState>,
}
