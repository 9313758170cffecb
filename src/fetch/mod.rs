// src/fetch/mod.rs
//! Fetch strategies: RSS/Atom feeds, static pages and browser-rendered pages.
//!
//! Fetchers never panic and never let an error reach the coordinator as a
//! crash: failures end up as `RawFetchResult::Missing`, which the classifier
//! maps to Unknown.

pub mod feed;
pub mod page;
pub mod rendered;

use std::time::{Duration, Instant};

use metrics::counter;
use reqwest::{Client, StatusCode};

use crate::config::EngineConfig;

pub use feed::{FeedEntry, FeedFetcher};
pub use page::{PageDocument, PageFetcher};
pub use rendered::{RenderSession, RenderedPageFetcher, SessionLauncher};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected http status {0}")]
    Status(u16),
    #[error("could not parse {what}: {reason}")]
    Parse { what: &'static str, reason: String },
    #[error("timed out waiting for {0}")]
    Timeout(String),
    #[error("browser session unavailable: {0}")]
    BrowserUnavailable(String),
    #[error("browser error: {0}")]
    Browser(String),
}

impl FetchError {
    /// The browser session itself misbehaved and must not be reused.
    pub fn is_session_fault(&self) -> bool {
        matches!(self, FetchError::Browser(_))
    }
}

/// Strategy-specific payload handed to the classifier. Dropped right after.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFetchResult {
    Feed(Vec<FeedEntry>),
    Document(PageDocument),
    Missing(String),
}

/// Pooled HTTP client shared by every fetch task.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    max_retries: u8,
    backoff_base_ms: u64,
    retry_budget: Duration,
}

impl HttpTransport {
    pub fn new(cfg: &EngineConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .connect_timeout(Duration::from_secs(cfg.request_timeout_secs.min(5)))
            .timeout(cfg.request_timeout())
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self {
            client,
            max_retries: cfg.max_retries,
            backoff_base_ms: cfg.retry_backoff_ms,
            retry_budget: cfg.task_timeout(),
        })
    }

    /// GET with bounded retries: 429, 5xx and connection errors are retried
    /// with exponential backoff; anything else fails at once. Timed-out
    /// requests are final, and no retry starts once it would outlive the
    /// task budget.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match self.client.get(url).send().await {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_success() {
                        return Ok(rsp.text().await?);
                    }
                    if !is_retryable_status(status) {
                        return Err(FetchError::Status(status.as_u16()));
                    }
                    FetchError::Status(status.as_u16())
                }
                Err(e) => {
                    if e.is_timeout() || !(e.is_connect() || e.is_request()) {
                        return Err(FetchError::Http(e));
                    }
                    FetchError::Http(e)
                }
            };

            let backoff = Duration::from_millis(self.backoff_base_ms << (attempt - 1).min(6));
            if attempt > u32::from(self.max_retries) || started.elapsed() + backoff >= self.retry_budget {
                return Err(err);
            }
            tracing::debug!(target: "fetch", %url, error = %err, attempt, "retrying");
            counter!("status_fetch_retries_total").increment(1);
            tokio::time::sleep(backoff).await;
        }
    }

    /// Single GET, no retries.
    pub async fn get_text_once(&self, url: &str) -> Result<String, FetchError> {
        let rsp = self.client.get(url).send().await?;
        let status = rsp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(rsp.text().await?)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}
