//! Application configuration for Leizilla.
//!
//! User config lives at `~/.leizilla/leizilla.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LeizillaError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leizilla.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leizilla";

// ---------------------------------------------------------------------------
// Config structs (matching leizilla.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Internet Archive settings.
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// OCR text retrieval policy.
    #[serde(default)]
    pub text: TextConfig,

    /// Per-source connector settings.
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Downloaded PDFs land in `{downloads_dir}/{origin}/{id}.pdf`.
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,

    #[serde(default = "default_exports_dir")]
    pub exports_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_path: default_db_path(),
            downloads_dir: default_downloads_dir(),
            exports_dir: default_exports_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/leizilla.db")
}
fn default_downloads_dir() -> PathBuf {
    PathBuf::from("data/downloads")
}
fn default_exports_dir() -> PathBuf {
    PathBuf::from("data/exports")
}

/// `[crawler]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Minimum ms between requests to a source.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for transient network failures.
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Pages per `discover` call.
    #[serde(default = "default_pages_per_batch")]
    pub pages_per_batch: u32,

    /// Hard bound on pages visited in a single run.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Consecutive empty pages after which a source is considered exhausted.
    #[serde(default = "default_max_empty_pages")]
    pub max_empty_pages: u32,

    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    #[serde(default = "default_download_concurrency")]
    pub download_concurrency: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            rate_limit_ms: default_rate_limit(),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            user_agent: default_user_agent(),
            pages_per_batch: default_pages_per_batch(),
            max_pages: default_max_pages(),
            max_empty_pages: default_max_empty_pages(),
            max_consecutive_failures: default_max_consecutive_failures(),
            download_concurrency: default_download_concurrency(),
        }
    }
}

fn default_rate_limit() -> u64 {
    2000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_retries() -> u32 {
    3
}
fn default_user_agent() -> String {
    concat!(
        "Mozilla/5.0 (compatible; Leizilla/",
        env!("CARGO_PKG_VERSION"),
        "; +https://github.com/franklinbaldo/leizilla)"
    )
    .into()
}
fn default_pages_per_batch() -> u32 {
    10
}
fn default_max_pages() -> u32 {
    100
}
fn default_max_empty_pages() -> u32 {
    5
}
fn default_max_consecutive_failures() -> u32 {
    3
}
fn default_download_concurrency() -> usize {
    4
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Attempts after the first when the database reports it is busy.
    #[serde(default = "default_busy_retries")]
    pub busy_retries: u32,

    #[serde(default = "default_busy_backoff_ms")]
    pub busy_backoff_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            busy_retries: default_busy_retries(),
            busy_backoff_ms: default_busy_backoff_ms(),
        }
    }
}

fn default_archive_timeout_secs() -> u64 {
    300
}

fn default_busy_retries() -> u32 {
    3
}
fn default_busy_backoff_ms() -> u64 {
    50
}

/// `[archive]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// S3-compatible upload endpoint.
    #[serde(default = "default_s3_endpoint")]
    pub s3_endpoint: String,

    #[serde(default = "default_download_base")]
    pub download_base: String,

    #[serde(default = "default_details_base")]
    pub details_base: String,

    /// Collection for law PDFs.
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Collection for exported datasets.
    #[serde(default = "default_datasets_collection")]
    pub datasets_collection: String,

    /// Name of the env var holding the access key (never store the key itself).
    #[serde(default = "default_access_key_env")]
    pub access_key_env: String,

    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,

    /// Whole-request timeout for uploads and OCR fetches.
    #[serde(default = "default_archive_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            s3_endpoint: default_s3_endpoint(),
            download_base: default_download_base(),
            details_base: default_details_base(),
            collection: default_collection(),
            datasets_collection: default_datasets_collection(),
            access_key_env: default_access_key_env(),
            secret_key_env: default_secret_key_env(),
            timeout_secs: default_archive_timeout_secs(),
        }
    }
}

fn default_s3_endpoint() -> String {
    "https://s3.us.archive.org".into()
}
fn default_download_base() -> String {
    "https://archive.org/download".into()
}
fn default_details_base() -> String {
    "https://archive.org/details".into()
}
fn default_collection() -> String {
    "leizilla".into()
}
fn default_datasets_collection() -> String {
    "leizilla-datasets".into()
}
fn default_access_key_env() -> String {
    "IA_ACCESS_KEY".into()
}
fn default_secret_key_env() -> String {
    "IA_SECRET_KEY".into()
}

/// What to do with archived records whose OCR text has not appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextPolicy {
    /// Ask once; records without text stay queryable by metadata only.
    #[default]
    Keep,
    /// Ask again on every run until `max_text_attempts` is reached.
    Retry,
}

/// `[text]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextConfig {
    #[serde(default)]
    pub missing_text_policy: TextPolicy,

    #[serde(default = "default_max_text_attempts")]
    pub max_text_attempts: u32,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            missing_text_policy: TextPolicy::Keep,
            max_text_attempts: default_max_text_attempts(),
        }
    }
}

impl TextConfig {
    /// Attempt bound used to select records for OCR retrieval.
    pub fn attempt_limit(&self) -> u32 {
        match self.missing_text_policy {
            TextPolicy::Keep => 1,
            TextPolicy::Retry => self.max_text_attempts.max(1),
        }
    }
}

fn default_max_text_attempts() -> u32 {
    5
}

/// `[sources]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub rondonia: RondoniaConfig,
}

/// `[sources.rondonia]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RondoniaConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Portal root; document pages live under `/COTEL/Livros/detalhes.aspx`.
    #[serde(default = "default_rondonia_base_url")]
    pub base_url: String,
}

impl Default for RondoniaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_rondonia_base_url(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_rondonia_base_url() -> String {
    "http://ditel.casacivil.ro.gov.br".into()
}

// ---------------------------------------------------------------------------
// Crawl config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration, merged from config file and CLI flags.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Delay between consecutive discovery calls.
    pub rate_limit_ms: u64,
    pub pages_per_batch: u32,
    /// Hard bound on pages visited in this run.
    pub max_pages: u32,
    pub max_empty_pages: u32,
    pub max_consecutive_failures: u32,
    pub download_concurrency: usize,
    /// First page of the window; overrides the persisted marker when set.
    pub start: Option<u64>,
    /// Inclusive last page of the window.
    pub end: Option<u64>,
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            rate_limit_ms: config.crawler.rate_limit_ms,
            pages_per_batch: config.crawler.pages_per_batch.max(1),
            max_pages: config.crawler.max_pages,
            max_empty_pages: config.crawler.max_empty_pages,
            max_consecutive_failures: config.crawler.max_consecutive_failures.max(1),
            download_concurrency: config.crawler.download_concurrency.max(1),
            start: None,
            end: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leizilla/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeizillaError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leizilla/leizilla.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LeizillaError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LeizillaError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeizillaError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeizillaError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeizillaError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read archive credentials from the env vars named in config.
pub fn archive_credentials(config: &ArchiveConfig) -> Result<(String, String)> {
    let read = |var_name: &str| match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(LeizillaError::config(format!(
            "Internet Archive credentials not found. Set the {var_name} environment variable.\n\
             Get keys at https://archive.org/account/s3.php"
        ))),
    };
    Ok((read(&config.access_key_env)?, read(&config.secret_key_env)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("rate_limit_ms = 2000"));
        assert!(toml_str.contains("IA_ACCESS_KEY"));
        assert!(toml_str.contains("missing_text_policy = \"keep\""));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.crawler.retries, 3);
        assert_eq!(parsed.archive.collection, "leizilla");
        assert_eq!(parsed.paths.db_path, PathBuf::from("data/leizilla.db"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[crawler]
rate_limit_ms = 0
download_concurrency = 8

[text]
missing_text_policy = "retry"
max_text_attempts = 3

[sources.rondonia]
base_url = "http://localhost:9999"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.crawler.rate_limit_ms, 0);
        assert_eq!(config.crawler.download_concurrency, 8);
        assert_eq!(config.crawler.timeout_secs, 30);
        assert_eq!(config.text.missing_text_policy, TextPolicy::Retry);
        assert_eq!(config.text.attempt_limit(), 3);
        assert_eq!(config.sources.rondonia.base_url, "http://localhost:9999");
        assert!(config.sources.rondonia.enabled);
    }

    #[test]
    fn keep_policy_allows_single_attempt() {
        let text = TextConfig::default();
        assert_eq!(text.attempt_limit(), 1);
    }

    #[test]
    fn crawl_config_from_app_config() {
        let app = AppConfig::default();
        let crawl = CrawlConfig::from(&app);
        assert_eq!(crawl.rate_limit_ms, 2000);
        assert_eq!(crawl.max_consecutive_failures, 3);
        assert_eq!(crawl.download_concurrency, 4);
        assert!(crawl.start.is_none());
    }

    #[test]
    fn missing_archive_credentials() {
        let config = ArchiveConfig {
            access_key_env: "LZ_TEST_NONEXISTENT_ACCESS_12345".into(),
            secret_key_env: "LZ_TEST_NONEXISTENT_SECRET_12345".into(),
            ..ArchiveConfig::default()
        };
        let result = archive_credentials(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("LZ_TEST_NONEXISTENT_ACCESS_12345"));
    }
}
