//! Headless browser fallback
//!
//! Pages whose metadata only appears after scripts run are rendered in a
//! headless Chromium driven over the Chrome DevTools Protocol. Each render
//! launches its own browser process and tears it down afterwards; this is the
//! rare, expensive path taken only once HTTP attempts are exhausted.

use crate::config::BrowserConfig;
use crate::crawler::fetcher::FetchError;
use chromiumoxide::{Browser, BrowserConfig as CdpConfig};
use futures::future::BoxFuture;
use futures::StreamExt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};

/// How long a browser gets to exit on its own before it is killed
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Capability of producing fully rendered markup for a URL
pub trait PageRenderer: Send + Sync {
    fn render<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>>;
}

/// Renders pages in a freshly launched headless Chromium
pub struct ChromiumRenderer {
    timeout: Duration,
    chrome_binary: Option<PathBuf>,
    launches: AtomicU64,
}

impl ChromiumRenderer {
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            timeout: config.timeout(),
            chrome_binary: config.chrome_binary.clone(),
            launches: AtomicU64::new(0),
        }
    }

    /// Builds the launch configuration for one browser process
    ///
    /// Every launch gets its own profile directory so concurrent renders do
    /// not fight over the profile lock.
    fn launch_config(&self, profile_dir: &Path) -> Result<CdpConfig, FetchError> {
        let mut builder = CdpConfig::builder()
            .no_sandbox()
            .disable_default_args()
            .user_data_dir(profile_dir);

        if let Some(bin) = self.find_chrome_binary() {
            tracing::debug!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--no-first-run")
            .build()
            .map_err(FetchError::BrowserLaunch)
    }

    /// Locates a Chrome/Chromium binary
    ///
    /// Order: configured path, `$CHROME_BIN`, well-known install locations.
    /// `None` lets chromiumoxide do its own lookup.
    fn find_chrome_binary(&self) -> Option<PathBuf> {
        if let Some(bin) = &self.chrome_binary {
            return Some(bin.clone());
        }

        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(&p);
            if path.exists() {
                return Some(path);
            }
        }

        [
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    }

    fn next_profile_dir(&self) -> PathBuf {
        let n = self.launches.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("metascrape-chrome-{}-{}", std::process::id(), n))
    }

    async fn render_page(&self, url: &str) -> Result<String, FetchError> {
        let deadline = Instant::now() + self.timeout;
        let timeout_secs = self.timeout.as_secs();
        let profile_dir = self.next_profile_dir();
        let config = self.launch_config(&profile_dir)?;

        let (mut browser, mut handler) = timeout_at(deadline, Browser::launch(config))
            .await
            .map_err(|_| FetchError::RenderTimeout(timeout_secs))?
            .map_err(|e| FetchError::BrowserLaunch(e.to_string()))?;

        // The CDP handler must be polled continuously for the connection to work.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let content = timeout_at(deadline, async {
            let page = browser
                .new_page(url)
                .await
                .map_err(|e| FetchError::Navigation(e.to_string()))?;

            page.find_element("body")
                .await
                .map_err(|e| FetchError::Navigation(format!("page did not render body: {}", e)))?;

            page.content()
                .await
                .map_err(|e| FetchError::Navigation(format!("failed to read content: {}", e)))
        })
        .await
        .unwrap_or(Err(FetchError::RenderTimeout(timeout_secs)));

        let closed = bounded(TEARDOWN_TIMEOUT, async {
            browser.close().await.map_err(|e| e.to_string())?;
            browser.wait().await.map_err(|e| e.to_string())?;
            Ok::<(), String>(())
        })
        .await;
        if let Err(reason) = closed {
            tracing::debug!("Browser close failed for {} ({}), killing it", url, reason);
            if let Some(Err(e)) = browser.kill().await {
                tracing::warn!("Could not kill browser for {}: {}", url, e);
            }
        }
        handler_task.abort();

        if let Err(e) = std::fs::remove_dir_all(&profile_dir) {
            tracing::trace!("Could not remove {}: {}", profile_dir.display(), e);
        }

        content
    }
}

/// Runs one teardown step, failing it if it has not finished within `limit`
async fn bounded<F>(limit: Duration, step: F) -> Result<(), String>
where
    F: Future<Output = Result<(), String>>,
{
    timeout(limit, step)
        .await
        .unwrap_or_else(|_| Err(format!("no exit within {:?}", limit)))
}

impl PageRenderer for ChromiumRenderer {
    fn render<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        Box::pin(async move {
            tracing::debug!("Rendering {} in headless browser", url);
            self.render_page(url).await
        })
    }
}
