//! Metascrape: a resumable page metadata harvester
//!
//! This crate fetches a large list of page URLs, extracts structured metadata
//! (upload date, votes, views, categories, tags, title) and accumulates the
//! results in a CSV output store that survives restarts and retry passes.

pub mod config;
pub mod crawler;
pub mod input;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Metascrape operations
///
/// Per-URL fetch and parse failures never surface here; they are contained in
/// the fetcher and recorded in the failure log. Only problems that make the
/// whole run meaningless (bad config, unreadable input, output store I/O)
/// propagate as `ScrapeError`.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Errors raised while reading the input URL list
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to read input file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse input file: {0}")]
    Csv(#[from] csv::Error),

    #[error("Input file has no '{0}' column")]
    MissingColumn(String),

    #[error("Input file is empty")]
    Empty,
}

/// Result type alias for Metascrape operations
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{FetchError, Record};
pub use state::FetchState;
