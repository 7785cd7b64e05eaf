//! Batch scheduler
//!
//! This module handles:
//! - Splitting the work set into fixed-size batches
//! - Running every fetch in a batch concurrently, collecting results in
//!   completion order
//! - Persisting each batch before the next one starts
//! - Jittered pacing between batches

use crate::config::PipelineConfig;
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::record::Record;
use crate::storage::BatchSink;
use crate::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Totals for one scheduler run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Number of batches persisted
    pub batches: usize,

    /// Number of records persisted
    pub records: usize,

    /// Records with at least one metadata field
    pub with_metadata: usize,
}

impl BatchReport {
    pub fn without_metadata(&self) -> usize {
        self.records - self.with_metadata
    }
}

/// Drives the fetcher over a work set, one batch at a time
///
/// Batches are strictly sequential. Within a batch every URL is started at
/// once; the fetcher's admission limit bounds how many requests are actually
/// in flight, so peak concurrency does not depend on the batch size.
pub struct Scheduler {
    config: PipelineConfig,
    fetcher: Arc<PageFetcher>,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `config` - Batch size and pacing settings
    /// * `fetcher` - The fetcher shared by every URL
    pub fn new(config: PipelineConfig, fetcher: Arc<PageFetcher>) -> Self {
        Self { config, fetcher }
    }

    /// Number of batches needed for `url_count` URLs
    pub fn batch_count(&self, url_count: usize) -> usize {
        url_count.div_ceil(self.config.batch_size.max(1))
    }

    /// Fetches every URL and persists results batch by batch
    ///
    /// # Returns
    ///
    /// * `Ok(BatchReport)` - Every batch was persisted
    /// * `Err(ScrapeError)` - Writing the sink or the failure log failed;
    ///   batches persisted before the error are kept
    pub async fn run(
        &self,
        urls: &[String],
        sink: &mut dyn BatchSink,
    ) -> Result<BatchReport> {
        let total = self.batch_count(urls.len());
        let mut report = BatchReport::default();

        for (index, batch) in urls.chunks(self.config.batch_size.max(1)).enumerate() {
            let number = index + 1;
            let started = Instant::now();

            let records = self.run_batch(number, total, batch).await?;
            sink.persist(&records)?;

            let with_metadata = records.iter().filter(|r| r.has_metadata()).count();
            report.batches += 1;
            report.records += records.len();
            report.with_metadata += with_metadata;

            tracing::info!(
                "Batch {}/{}: {} URLs in {:.1}s, {} with metadata ({} / {} done overall)",
                number,
                total,
                records.len(),
                started.elapsed().as_secs_f64(),
                with_metadata,
                report.records,
                urls.len()
            );

            if number < total {
                let pause = self.pacing_delay();
                tracing::debug!("Pausing {:?} before next batch", pause);
                tokio::time::sleep(pause).await;
            }
        }

        Ok(report)
    }

    /// Fetches one batch concurrently, in completion order
    async fn run_batch(
        &self,
        number: usize,
        total: usize,
        batch: &[String],
    ) -> Result<Vec<Record>> {
        let fetcher = &self.fetcher;
        let mut in_flight: FuturesUnordered<_> =
            batch.iter().map(|url| fetcher.fetch(url)).collect();

        let mut records = Vec::with_capacity(batch.len());
        while let Some(result) = in_flight.next().await {
            let record = result?;
            tracing::debug!(
                "[batch {}/{}] {}/{} {}",
                number,
                total,
                records.len() + 1,
                batch.len(),
                record.url
            );
            records.push(record);
        }

        Ok(records)
    }

    /// Random pause in `[pacing_min_ms, pacing_max_ms)`
    fn pacing_delay(&self) -> Duration {
        let (min, max) = (self.config.pacing_min_ms, self.config.pacing_max_ms);
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::rng().random_range(min..max))
    }
}
