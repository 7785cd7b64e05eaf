//! Crawler module for fetching pages and extracting their metadata
//!
//! This module contains the core scraping logic, including:
//! - HTTP fetching with retries and an admission limit
//! - Headless browser fallback for script-rendered pages
//! - Field extraction from page markup
//! - Batch scheduling and overall run coordination

mod browser;
mod coordinator;
mod counts;
mod fetcher;
mod parser;
mod record;
mod scheduler;

pub use browser::{ChromiumRenderer, PageRenderer};
pub use coordinator::{plan, run_pipeline, Coordinator, RunPlan, RunSummary};
pub use counts::parse_count;
pub use fetcher::{build_http_client, FetchError, PageFetcher};
pub use parser::{Extraction, Field, FieldExtractor, MarkupExtractor};
pub use record::Record;
pub use scheduler::{BatchReport, Scheduler};
