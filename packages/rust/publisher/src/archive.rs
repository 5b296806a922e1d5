//! Internet Archive S3-compatible upload and OCR text retrieval.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use leizilla_shared::{
    ArchiveConfig, LawRecord, LeizillaError, Result, archive_credentials, content_hash,
    fold_accents,
};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument, warn};

/// Identifier length limit enforced by the archive.
const MAX_IDENTIFIER_LEN: usize = 80;

const LICENSE_URL: &str = "https://creativecommons.org/publicdomain/mark/1.0/";
const CREATOR: &str = "Leizilla Project";
const METADATA_VERSION: &str = "1.0";

/// Where an uploaded file ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedItem {
    pub identifier: String,
    pub download_url: String,
    pub details_url: String,
    /// Predicted location of the derived OCR text (`{stem}_djvu.txt`).
    pub ocr_url: String,
}

/// Item identifier plus the `x-archive-meta-*` fields to send with a file.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub identifier: String,
    pub metadata: Vec<(String, String)>,
}

impl UploadRequest {
    /// Item for a single law's PDF.
    pub fn for_law(law: &LawRecord, collection: &str) -> Self {
        let year = law.year.unwrap_or_else(|| Utc::now().year());
        let law_type = law.law_type.as_deref().unwrap_or("lei");
        let number = law.number.as_deref().unwrap_or("unknown");

        let mut metadata = vec![
            ("collection".to_string(), collection.to_string()),
            ("mediatype".to_string(), "texts".to_string()),
            ("title".to_string(), law.title.clone()),
            ("creator".to_string(), CREATOR.to_string()),
            ("subject".to_string(), format!("lei; brasil; {}; jurídico", law.origin)),
            (
                "description".to_string(),
                format!(
                    "Lei brasileira indexada pelo projeto Leizilla. Origem: {}, Ano: {year}",
                    law.origin
                ),
            ),
            (
                "date".to_string(),
                law.publication_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| year.to_string()),
            ),
            ("language".to_string(), "Portuguese".to_string()),
            ("licenseurl".to_string(), LICENSE_URL.to_string()),
            ("leizilla-origem".to_string(), law.origin.clone()),
            ("leizilla-tipo".to_string(), law_type.to_string()),
            ("leizilla-numero".to_string(), number.to_string()),
            ("leizilla-ano".to_string(), year.to_string()),
            ("leizilla-id".to_string(), law.id.clone()),
            ("leizilla-version".to_string(), METADATA_VERSION.to_string()),
        ];
        if let Some(source) = law.original_url.as_deref() {
            metadata.push(("source".to_string(), source.to_string()));
        }
        if let Some(hash) = law.content_hash.as_deref() {
            metadata.push(("leizilla-sha256".to_string(), hash.to_string()));
        }

        Self {
            identifier: law_identifier(law),
            metadata,
        }
    }

    /// Item for an exported dataset of one origin (and optionally one year).
    pub fn for_dataset(origin: &str, year: Option<i32>, collection: &str) -> Self {
        let scope = year.map(|y| y.to_string()).unwrap_or_else(|| "completo".into());
        let mut title = format!("Dataset de Leis - {}", capitalize(origin));
        if let Some(y) = year {
            title.push_str(&format!(" ({y})"));
        }

        let metadata = vec![
            ("collection".to_string(), collection.to_string()),
            ("mediatype".to_string(), "data".to_string()),
            ("title".to_string(), title),
            ("creator".to_string(), CREATOR.to_string()),
            ("subject".to_string(), format!("lei; brasil; {origin}; dataset")),
            ("language".to_string(), "Portuguese".to_string()),
            ("licenseurl".to_string(), LICENSE_URL.to_string()),
            ("leizilla-origem".to_string(), origin.to_string()),
            ("leizilla-ano".to_string(), scope.clone()),
            ("leizilla-gerado-em".to_string(), Utc::now().to_rfc3339()),
            ("leizilla-version".to_string(), METADATA_VERSION.to_string()),
        ];

        Self {
            identifier: dataset_identifier(origin, year),
            metadata,
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Reduce to the characters the archive accepts in identifiers.
fn sanitize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in fold_accents(raw).to_lowercase().chars() {
        let c = if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
            c
        } else {
            '-'
        };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('-').to_string()
}

/// `leizilla-{origin}-{type}-{year}-{number}`, or a hashed short form when
/// that would exceed the archive's identifier limit.
pub fn law_identifier(law: &LawRecord) -> String {
    let year = law.year.unwrap_or_else(|| Utc::now().year());
    let law_type = law.law_type.as_deref().unwrap_or("lei");
    let number = law.number.as_deref().unwrap_or("unknown");

    let identifier = sanitize_identifier(&format!(
        "leizilla-{}-{law_type}-{year}-{number}",
        law.origin
    ));
    if identifier.len() <= MAX_IDENTIFIER_LEN {
        return identifier;
    }

    let digest = content_hash(law.id.as_bytes());
    sanitize_identifier(&format!("leizilla-{}-{year}-{}", law.origin, &digest[..8]))
}

/// `leizilla-dataset-{origin}-{year|completo}`.
pub fn dataset_identifier(origin: &str, year: Option<i32>) -> String {
    let scope = year.map(|y| y.to_string()).unwrap_or_else(|| "completo".into());
    sanitize_identifier(&format!("leizilla-dataset-{origin}-{scope}"))
}

/// OCR text location for a file download URL: `…/name.pdf` → `…/name_djvu.txt`.
pub fn ocr_url_for(download_url: &str) -> String {
    let (dir, file) = download_url
        .rsplit_once('/')
        .unwrap_or(("", download_url));
    let stem = file.rsplit_once('.').map(|(s, _)| s).unwrap_or(file);
    if dir.is_empty() {
        format!("{stem}_djvu.txt")
    } else {
        format!("{dir}/{stem}_djvu.txt")
    }
}

/// Header value for archive metadata. Non-ASCII values use the `uri()` form.
fn meta_header_value(value: &str) -> String {
    let single_line = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.is_ascii() {
        single_line
    } else {
        format!("uri({})", urlencoding::encode(&single_line))
    }
}

// ---------------------------------------------------------------------------
// Service contract
// ---------------------------------------------------------------------------

/// Archival storage with derived OCR text.
#[async_trait]
pub trait ArchiveService: Send + Sync {
    /// Upload `file` into the item described by `request`.
    async fn upload(&self, file: &Path, request: &UploadRequest) -> Result<ArchivedItem>;

    /// Fetch derived text. `Ok(None)` means the text is not available (yet).
    async fn fetch_text(&self, ocr_url: &str) -> Result<Option<String>>;
}

// ---------------------------------------------------------------------------
// InternetArchive
// ---------------------------------------------------------------------------

/// Internet Archive client using the S3-like `PUT` API.
pub struct InternetArchive {
    client: Client,
    config: ArchiveConfig,
    credentials: Option<(String, String)>,
}

impl InternetArchive {
    /// Build a client; credentials are read from the env vars named in
    /// config and only required when uploading.
    pub fn new(config: &ArchiveConfig, user_agent: &str, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(connect_timeout)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LeizillaError::Archival(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: config.clone(),
            credentials: archive_credentials(config).ok(),
        })
    }

    pub fn with_credentials(mut self, access: impl Into<String>, secret: impl Into<String>) -> Self {
        self.credentials = Some((access.into(), secret.into()));
        self
    }

    fn credentials(&self) -> Result<(String, String)> {
        match &self.credentials {
            Some(pair) => Ok(pair.clone()),
            None => archive_credentials(&self.config),
        }
    }

    fn item_urls(&self, identifier: &str, file_name: &str) -> ArchivedItem {
        let encoded = urlencoding::encode(file_name);
        let download_url = format!(
            "{}/{identifier}/{encoded}",
            self.config.download_base.trim_end_matches('/')
        );
        ArchivedItem {
            identifier: identifier.to_string(),
            ocr_url: ocr_url_for(&download_url),
            details_url: format!(
                "{}/{identifier}",
                self.config.details_base.trim_end_matches('/')
            ),
            download_url,
        }
    }
}

#[async_trait]
impl ArchiveService for InternetArchive {
    #[instrument(skip_all, fields(item = %request.identifier))]
    async fn upload(&self, file: &Path, request: &UploadRequest) -> Result<ArchivedItem> {
        let (access, secret) = self.credentials()?;

        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| LeizillaError::validation(format!("no file name in {}", file.display())))?
            .to_string();
        let body = tokio::fs::read(file)
            .await
            .map_err(|e| LeizillaError::io(file, e))?;
        let size = body.len();

        let url = format!(
            "{}/{}/{}",
            self.config.s3_endpoint.trim_end_matches('/'),
            request.identifier,
            urlencoding::encode(&file_name)
        );

        let mut builder = self
            .client
            .put(&url)
            .header("authorization", format!("LOW {access}:{secret}"))
            .header("x-amz-auto-make-bucket", "1")
            .header("x-archive-size-hint", size.to_string());
        for (key, value) in &request.metadata {
            builder = builder.header(format!("x-archive-meta-{key}"), meta_header_value(value));
        }

        debug!(url, size, "uploading");
        let response = builder
            .body(body)
            .send()
            .await
            .map_err(|e| LeizillaError::Archival(format!("{}: {e}", request.identifier)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(300).collect();
            warn!(%status, "archive upload rejected");
            return Err(LeizillaError::Archival(format!(
                "{}: HTTP {status}: {detail}",
                request.identifier
            )));
        }

        let item = self.item_urls(&request.identifier, &file_name);
        info!(url = %item.download_url, "uploaded to Internet Archive");
        Ok(item)
    }

    async fn fetch_text(&self, ocr_url: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(ocr_url)
            .send()
            .await
            .map_err(|e| request_error(ocr_url, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(ocr_url, "OCR text not available yet");
                Ok(None)
            }
            status if status.is_success() => {
                let text = response
                    .text()
                    .await
                    .map_err(|e| LeizillaError::Archival(format!("{ocr_url}: {e}")))?;
                Ok(Some(text).filter(|t| !t.trim().is_empty()))
            }
            status if status.is_server_error() => Err(LeizillaError::TransientNetwork(format!(
                "{ocr_url}: HTTP {status}"
            ))),
            status => Err(LeizillaError::Archival(format!("{ocr_url}: HTTP {status}"))),
        }
    }
}

/// Timeouts and connection failures are transient; anything else is final.
fn request_error(url: &str, e: reqwest::Error) -> LeizillaError {
    if e.is_timeout() || e.is_connect() {
        LeizillaError::TransientNetwork(format!("{url}: {e}"))
    } else {
        LeizillaError::Archival(format!("{url}: {e}"))
    }
}
