//! Run coordinator - full pipeline orchestration
//!
//! One run goes through these steps:
//! - Work out which input URLs still lack metadata in the output store
//! - Fetch them batch by batch into the main output table
//! - Retry every URL that is still empty into a side table
//! - Merge the side table back so each URL has one row
//!
//! Every step reads its inputs from disk, so a run killed at any point can
//! simply be started again.

use crate::config::{Config, OutputConfig};
use crate::crawler::browser::ChromiumRenderer;
use crate::crawler::fetcher::{build_http_client, PageFetcher};
use crate::crawler::parser::MarkupExtractor;
use crate::crawler::record::Record;
use crate::crawler::scheduler::{BatchReport, Scheduler};
use crate::input::read_urls;
use crate::storage::{failed, merge_retry, pending, CsvStore, FailureLog};
use crate::Result;
use std::sync::Arc;
use std::time::Instant;

/// What a run would do, computed without touching the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    /// Distinct URLs in the input
    pub input_urls: usize,

    /// Rows currently in the output table
    pub stored_rows: usize,

    /// Input URLs that still need fetching, in input order
    pub work_set: Vec<String>,

    /// URLs already in the output table without metadata
    pub failed: Vec<String>,
}

/// Counts reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub input_urls: usize,
    pub work_set: usize,
    pub retried: usize,
    pub rows: usize,
    pub with_metadata: usize,
    /// Input URLs that are still not done
    pub remaining: usize,
}

impl RunSummary {
    pub fn without_metadata(&self) -> usize {
        self.rows - self.with_metadata
    }
}

/// Computes the work set and failed set for `urls` against the output table
pub fn plan(output: &OutputConfig, urls: &[String]) -> Result<RunPlan> {
    let rows = CsvStore::new(&output.path).load()?;
    Ok(RunPlan {
        input_urls: distinct(urls),
        stored_rows: rows.len(),
        work_set: pending(urls, &rows),
        failed: failed(&rows),
    })
}

fn distinct(urls: &[String]) -> usize {
    urls.iter()
        .map(String::as_str)
        .collect::<std::collections::HashSet<_>>()
        .len()
}

/// Main run coordinator
pub struct Coordinator {
    config: Config,
    scheduler: Scheduler,
    main: CsvStore,
    retry: CsvStore,
}

impl Coordinator {
    /// Creates a coordinator with the HTTP fetcher and, when enabled, the
    /// headless browser fallback
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(ScrapeError)` - The HTTP client or the failure log could not be
    ///   set up
    pub fn new(config: Config) -> Result<Self> {
        let client = build_http_client(&config.fetch, config.pipeline.concurrency)?;
        let failure_log = FailureLog::open(&config.output.failure_log)?;
        tracing::debug!("Logging failures to {}", failure_log.path().display());

        let mut fetcher = PageFetcher::new(
            client,
            config.pipeline.concurrency,
            config.fetch.clone(),
            Arc::new(MarkupExtractor::new()),
            Arc::new(failure_log),
        );

        if config.browser.enabled {
            fetcher = fetcher.with_fallback(
                Arc::new(ChromiumRenderer::new(&config.browser)),
                config.browser.max_concurrent_renders,
            );
        } else {
            tracing::info!("Browser fallback disabled");
        }

        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    /// Creates a coordinator around an already configured fetcher
    pub fn with_fetcher(config: Config, fetcher: Arc<PageFetcher>) -> Self {
        let main = CsvStore::new(&config.output.path);
        let retry = CsvStore::new(&config.output.retry_path);
        let scheduler = Scheduler::new(config.pipeline.clone(), fetcher);

        Self {
            config,
            scheduler,
            main,
            retry,
        }
    }

    /// Runs the full pipeline over `urls`
    pub async fn run(&self, urls: &[String]) -> Result<RunSummary> {
        let start_time = Instant::now();

        // A retry table left behind by an interrupted run holds results that
        // would otherwise be fetched again.
        if self.retry.exists() {
            tracing::info!(
                "Found leftover retry table {}, merging it first",
                self.retry.path().display()
            );
            merge_retry(&self.main, &self.retry)?;
        }

        let plan = plan(&self.config.output, urls)?;
        tracing::info!(
            "{} input URLs, {} rows stored, {} to fetch",
            plan.input_urls,
            plan.stored_rows,
            plan.work_set.len()
        );

        let mut main = self.main.clone();
        let report = self.scheduler.run(&plan.work_set, &mut main).await?;
        log_pass("Main pass", &report);

        let retry_set = failed(&self.main.load()?);
        let retried = if self.config.pipeline.retry_pass && !retry_set.is_empty() {
            tracing::info!("Retrying {} URLs without metadata", retry_set.len());
            let mut retry = self.retry.clone();
            let report = self.scheduler.run(&retry_set, &mut retry).await?;
            log_pass("Retry pass", &report);
            retry_set.len()
        } else {
            0
        };

        merge_retry(&self.main, &self.retry)?;

        let rows = self.main.load()?;
        let summary = RunSummary {
            input_urls: plan.input_urls,
            work_set: plan.work_set.len(),
            retried,
            rows: rows.len(),
            with_metadata: count_with_metadata(&rows),
            remaining: pending(urls, &rows).len(),
        };

        tracing::info!(
            "Run finished in {:.1}s: {} rows, {} with metadata, {} without, \
             {} of {} input URLs remaining",
            start_time.elapsed().as_secs_f64(),
            summary.rows,
            summary.with_metadata,
            summary.without_metadata(),
            summary.remaining,
            summary.input_urls
        );

        Ok(summary)
    }
}

fn log_pass(name: &str, report: &BatchReport) {
    tracing::info!(
        "{} complete: {} records in {} batches, {} with metadata, {} without",
        name,
        report.records,
        report.batches,
        report.with_metadata,
        report.without_metadata()
    );
}

/// Reads the input list and runs the full pipeline
///
/// # Example
///
/// ```no_run
/// use metascrape::config::load_config;
/// use metascrape::crawler::run_pipeline;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("metascrape.toml"))?;
/// let summary = run_pipeline(config).await?;
/// println!("{} rows with metadata", summary.with_metadata);
/// # Ok(())
/// # }
/// ```
pub async fn run_pipeline(config: Config) -> Result<RunSummary> {
    let urls = read_urls(&config.input)?;
    Coordinator::new(config)?.run(&urls).await
}

/// Rows of `records` that carry metadata
pub(crate) fn count_with_metadata(records: &[Record]) -> usize {
    records.iter().filter(|r| r.has_metadata()).count()
}
