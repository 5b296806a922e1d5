//! HTTP fetch contract and its reqwest implementation.
//!
//! Connectors only depend on "fetch page text" and "fetch binary"; the
//! [`PageFetcher`] trait keeps them testable and independent of the client.

use std::time::Duration;

use async_trait::async_trait;
use leizilla_shared::{CrawlerConfig, LeizillaError, Result, RetryConfig, with_retry_if};
use reqwest::{Client, StatusCode};
use tracing::debug;

/// Raw response of a binary fetch.
#[derive(Debug, Clone)]
pub struct FetchedBinary {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FetchedBinary {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the declared content type looks like a PDF.
    pub fn is_pdf(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("pdf"))
    }
}

/// Minimal fetch capability used by connectors.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a page and return its decoded body. Non-2xx is an error.
    async fn fetch_text(&self, url: &str) -> Result<String>;

    /// Fetch raw bytes. Non-2xx responses are returned, not raised, so the
    /// caller can validate status and content type itself.
    async fn fetch_binary(&self, url: &str) -> Result<FetchedBinary>;
}

// ---------------------------------------------------------------------------
// HttpFetcher
// ---------------------------------------------------------------------------

/// reqwest-backed fetcher with per-request timeout and bounded retries.
pub struct HttpFetcher {
    client: Client,
    retry: RetryConfig,
}

impl HttpFetcher {
    /// Build a fetcher from `[crawler]` settings.
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LeizillaError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            retry: RetryConfig::with_delays(config.retries, 1000, 15_000),
        })
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_send_error(url, e))?;

        let status = response.status();
        if is_transient_status(status) {
            return Err(LeizillaError::TransientNetwork(format!("{url}: HTTP {status}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        with_retry_if(
            &self.retry,
            || async move {
                let response = self.get(url).await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(LeizillaError::Network(format!("{url}: HTTP {status}")));
                }
                response
                    .text()
                    .await
                    .map_err(|e| LeizillaError::TransientNetwork(format!("{url}: body read failed: {e}")))
            },
            LeizillaError::is_retryable,
        )
        .await
    }

    async fn fetch_binary(&self, url: &str) -> Result<FetchedBinary> {
        with_retry_if(
            &self.retry,
            || async move {
                let response = self.get(url).await?;
                let status = response.status().as_u16();
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let bytes = response.bytes().await.map_err(|e| {
                    LeizillaError::TransientNetwork(format!("{url}: body read failed: {e}"))
                })?;
                Ok(FetchedBinary {
                    status,
                    content_type,
                    bytes: bytes.to_vec(),
                })
            },
            LeizillaError::is_retryable,
        )
        .await
    }
}

/// 5xx and 429 are worth another attempt; everything else is final.
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn classify_send_error(url: &str, e: reqwest::Error) -> LeizillaError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        LeizillaError::TransientNetwork(format!("{url}: {e}"))
    } else {
        LeizillaError::Network(format!("{url}: {e}"))
    }
}
