use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Metascrape
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Batch scheduling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineConfig {
    /// Maximum number of URLs per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum number of requests in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Lower bound of the pause between batches (milliseconds)
    #[serde(default = "default_pacing_min_ms")]
    pub pacing_min_ms: u64,

    /// Exclusive upper bound of the pause between batches (milliseconds)
    #[serde(default = "default_pacing_max_ms")]
    pub pacing_max_ms: u64,

    /// Whether to rerun URLs that ended with no metadata
    #[serde(default = "default_true")]
    pub retry_pass: bool,
}

/// Primary HTTP fetch configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetchConfig {
    /// Number of HTTP attempts before falling back to the browser
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Timeout for a single HTTP attempt (seconds)
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,

    /// Base of the exponential backoff between attempts (milliseconds)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// User-Agent header sent on every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Headless browser fallback configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BrowserConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Timeout for launching, navigating and capturing one page (seconds)
    #[serde(default = "default_browser_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of browser renders running at once
    #[serde(default = "default_max_concurrent_renders")]
    pub max_concurrent_renders: usize,

    /// Explicit Chrome/Chromium executable
    #[serde(default)]
    pub chrome_binary: Option<PathBuf>,
}

/// Input URL list configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InputConfig {
    pub path: PathBuf,

    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    #[serde(default = "default_url_column")]
    pub url_column: String,

    /// Only read the first `limit` data rows
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Output locations
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Main accumulated output table
    #[serde(default = "default_output_path")]
    pub path: PathBuf,

    /// Side output written by the retry pass, merged and removed afterwards
    #[serde(default = "default_retry_path")]
    pub retry_path: PathBuf,

    /// Append-only log of URLs that ultimately failed
    #[serde(default = "default_failure_log")]
    pub failure_log: PathBuf,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Sleep before attempt `attempt + 1`, after `attempt` (1-based) failed
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

impl BrowserConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            pacing_min_ms: default_pacing_min_ms(),
            pacing_max_ms: default_pacing_max_ms(),
            retry_pass: true,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_secs: default_fetch_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_browser_timeout_secs(),
            max_concurrent_renders: default_max_concurrent_renders(),
            chrome_binary: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            retry_path: default_retry_path(),
            failure_log: default_failure_log(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    100
}

fn default_concurrency() -> usize {
    30
}

fn default_pacing_min_ms() -> u64 {
    800
}

fn default_pacing_max_ms() -> u64 {
    2000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_fetch_timeout_secs() -> u64 {
    20
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64)".to_string()
}

fn default_browser_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_renders() -> usize {
    4
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_url_column() -> String {
    "url".to_string()
}

fn default_output_path() -> PathBuf {
    PathBuf::from("output.csv")
}

fn default_retry_path() -> PathBuf {
    PathBuf::from("output.retry.csv")
}

fn default_failure_log() -> PathBuf {
    PathBuf::from("failed_urls.log")
}
