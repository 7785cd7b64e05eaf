/// Per-URL fetch state definitions
///
/// A URL moves through a small state machine while it is being fetched:
///
/// ```text
/// Attempting(1) ──ok──▶ Success
///      │ err
///      ▼
/// Attempting(n) ──ok──▶ Success
///      │ err, n == max
///      ▼
/// FallbackAttempting ──ok──▶ Success
///      │ err
///      ▼
///    Failed
/// ```
///
/// When no fallback is available, exhausting the HTTP attempts goes straight
/// to `Failed`.
use std::fmt;

/// Represents where a single URL is in the two-tier fetch strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchState {
    /// HTTP attempt number `n` (1-based) is in progress
    Attempting(u32),

    /// HTTP attempts are exhausted; rendering in a headless browser
    FallbackAttempting,

    /// Page content was obtained and handed to the extractor
    Success,

    /// Every strategy failed; the URL yields an all-absent record
    Failed,
}

impl FetchState {
    /// The state every URL starts in
    pub fn initial() -> Self {
        Self::Attempting(1)
    }

    /// Returns true if no further work happens for this URL
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Returns true if the current step is the browser fallback
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::FallbackAttempting)
    }

    /// State after the current step produced page content
    pub fn on_success(self) -> Self {
        if self.is_terminal() {
            self
        } else {
            Self::Success
        }
    }

    /// State after the current step failed
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Number of HTTP attempts allowed
    /// * `has_fallback` - Whether a browser fallback is configured
    pub fn on_failure(self, max_attempts: u32, has_fallback: bool) -> Self {
        match self {
            Self::Attempting(n) if n < max_attempts => Self::Attempting(n + 1),
            Self::Attempting(_) if has_fallback => Self::FallbackAttempting,
            Self::Attempting(_) | Self::FallbackAttempting => Self::Failed,
            terminal => terminal,
        }
    }
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attempting(n) => write!(f, "attempt {}", n),
            Self::FallbackAttempting => write!(f, "browser fallback"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
