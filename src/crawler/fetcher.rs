//! HTTP fetcher implementation
//!
//! This module handles the primary fetch path for a single URL:
//! - Building the shared HTTP client with the configured user agent
//! - Admission limiting of in-flight requests
//! - Retry with exponential backoff on any failure
//! - Escalation to the browser fallback once HTTP attempts are exhausted
//! - Error classification for the failure log

use crate::config::FetchConfig;
use crate::crawler::browser::PageRenderer;
use crate::crawler::parser::FieldExtractor;
use crate::crawler::record::Record;
use crate::state::FetchState;
use crate::storage::FailureLog;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Why a URL could not be fetched
///
/// These errors are contained per URL: they end up in the failure log and
/// as an all-absent record, never as a run failure.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("{0}")]
    Request(String),

    #[error("failed to launch browser: {0}")]
    BrowserLaunch(String),

    #[error("browser navigation failed: {0}")]
    Navigation(String),

    #[error("browser render timed out after {0}s")]
    RenderTimeout(u64),
}

impl FetchError {
    /// Stable classification written to the failure log
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "Timeout",
            Self::Connect(_) => "ConnectError",
            Self::Status(_) => "HttpStatus",
            Self::Body(_) => "BodyError",
            Self::Request(_) => "RequestError",
            Self::BrowserLaunch(_) => "BrowserLaunchError",
            Self::Navigation(_) => "NavigationError",
            Self::RenderTimeout(_) => "RenderTimeout",
        }
    }

    fn from_reqwest(error: reqwest::Error, timeout_secs: u64) -> Self {
        if error.is_timeout() {
            Self::Timeout(timeout_secs)
        } else if error.is_connect() {
            Self::Connect(error.to_string())
        } else if error.is_body() || error.is_decode() {
            Self::Body(error.to_string())
        } else {
            Self::Request(error.to_string())
        }
    }
}

/// Builds the HTTP client shared by every fetch in a run
///
/// # Arguments
///
/// * `config` - The fetch configuration (user agent and per-attempt timeout)
/// * `concurrency` - Expected number of simultaneous requests, used to size
///   the idle connection pool
///
/// # Example
///
/// ```no_run
/// use metascrape::config::FetchConfig;
/// use metascrape::crawler::build_http_client;
///
/// let client = build_http_client(&FetchConfig::default(), 30).unwrap();
/// ```
pub fn build_http_client(
    config: &FetchConfig,
    concurrency: usize,
) -> Result<Client, reqwest::Error> {
    let timeout = config.timeout();

    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .pool_max_idle_per_host(concurrency)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Browser renderer plus its own admission limit
struct Fallback {
    renderer: Arc<dyn PageRenderer>,
    permits: Semaphore,
}

/// Fetches one URL at a time into a [`Record`]
///
/// A single `PageFetcher` is shared by every concurrent fetch in a batch.
/// At most `concurrency` HTTP requests are in flight at once across all of
/// them; a request holds its permit only while it is on the wire, not while
/// it sleeps between attempts.
pub struct PageFetcher {
    client: Client,
    permits: Semaphore,
    config: FetchConfig,
    extractor: Arc<dyn FieldExtractor>,
    failure_log: Arc<FailureLog>,
    fallback: Option<Fallback>,
}

impl PageFetcher {
    /// Creates a fetcher without a browser fallback
    pub fn new(
        client: Client,
        concurrency: usize,
        config: FetchConfig,
        extractor: Arc<dyn FieldExtractor>,
        failure_log: Arc<FailureLog>,
    ) -> Self {
        Self {
            client,
            permits: Semaphore::new(concurrency.max(1)),
            config,
            extractor,
            failure_log,
            fallback: None,
        }
    }

    /// Adds a browser fallback allowed to run `max_concurrent` renders at once
    pub fn with_fallback(
        mut self,
        renderer: Arc<dyn PageRenderer>,
        max_concurrent: usize,
    ) -> Self {
        self.fallback = Some(Fallback {
            renderer,
            permits: Semaphore::new(max_concurrent.max(1)),
        });
        self
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Fetches a URL and extracts its metadata
    ///
    /// Fetch failures are logged to the failure log and produce an
    /// all-absent record. The only error returned is a failure to write the
    /// failure log itself.
    pub async fn fetch(&self, url: &str) -> crate::Result<Record> {
        match self.fetch_content(url).await {
            Ok(html) => {
                let extraction = self.extractor.extract(&html);
                let invalid = extraction.invalid_fields();
                if !invalid.is_empty() {
                    tracing::debug!("Unparseable fields on {}: {}", url, invalid.join(", "));
                }
                Ok(extraction.into_record(url))
            }
            Err(error) => {
                tracing::error!("Giving up on {}: {}", url, error);
                self.failure_log.record(url, &error)?;
                Ok(Record::empty(url))
            }
        }
    }

    /// Walks one URL through its [`FetchState`] until it is terminal
    ///
    /// HTTP attempts come first, with a backoff sleep between them. Once they
    /// are exhausted the browser fallback, when configured, gets one try.
    /// Returns the content on success or the error of the last step.
    async fn fetch_content(&self, url: &str) -> Result<String, FetchError> {
        let mut state = FetchState::initial();

        loop {
            let outcome = if state.is_fallback() {
                self.render(url).await
            } else {
                self.fetch_once(url).await
            };

            let next = match &outcome {
                Ok(_) => state.on_success(),
                Err(_) => state.on_failure(self.config.max_attempts, self.has_fallback()),
            };
            if next.is_terminal() {
                tracing::trace!("{}: {} -> {}", url, state, next);
                return outcome;
            }

            if let (FetchState::Attempting(attempt), Err(error)) = (state, &outcome) {
                if next.is_fallback() {
                    tracing::warn!(
                        "{} failed {} HTTP attempt(s) ({}), rendering in browser",
                        url,
                        attempt,
                        error
                    );
                } else {
                    let backoff = self.config.backoff(attempt);
                    tracing::warn!(
                        "{} attempt {} failed ({}), retrying in {:?}",
                        url,
                        attempt,
                        error,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
            state = next;
        }
    }

    /// Renders the page in the browser fallback under its admission limit
    async fn render(&self, url: &str) -> Result<String, FetchError> {
        let Some(fallback) = &self.fallback else {
            return Err(FetchError::BrowserLaunch(
                "no browser fallback configured".to_string(),
            ));
        };

        let _permit = fallback
            .permits
            .acquire()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;
        fallback.renderer.render(url).await
    }

    /// A single GET request; any non-2xx status is an error
    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let timeout_secs = self.config.timeout_secs;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(e, timeout_secs))
    }
}
