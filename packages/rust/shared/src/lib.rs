//! Shared types, error model, and configuration for Leizilla.
//!
//! This crate is the foundation depended on by all other Leizilla crates.
//! It provides:
//! - [`LeizillaError`], the unified error type
//! - Domain types ([`LawRecord`], [`LawFilter`], [`CrawlState`])
//! - Configuration ([`AppConfig`], [`CrawlConfig`], config loading)
//! - Text helpers for normalization, identifiers and content hashing
//! - [`with_retry_if`], bounded exponential backoff

pub mod config;
pub mod error;
pub mod retry;
pub mod text;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ArchiveConfig, CrawlConfig, CrawlerConfig, PathsConfig, RondoniaConfig,
    SourcesConfig, StorageConfig, TextConfig, TextPolicy, archive_credentials, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{LeizillaError, Result};
pub use retry::{RetryConfig, with_retry_if};
pub use text::{content_hash, fold_accents, law_id, normalize_text, slugify};
pub use types::{
    CrawlState, ExportFormat, LawFilter, LawRecord, LawStatus, ProcessingStage, StorageStats,
};
