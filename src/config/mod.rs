//! Configuration module for Metascrape
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use metascrape::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("metascrape.toml")).unwrap();
//! println!("Batch size: {}", config.pipeline.batch_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{BrowserConfig, Config, FetchConfig, InputConfig, OutputConfig, PipelineConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
