//! Statistics over the output table
//!
//! This module provides functionality for summarising what a run (or a
//! series of runs) has accumulated in the output table.

use crate::crawler::Record;
use crate::storage::{CsvStore, StorageResult};
use std::collections::HashSet;

/// Output table statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputStatistics {
    /// Total number of rows
    pub total_rows: usize,

    /// Number of distinct URLs
    pub unique_urls: usize,

    /// Rows with at least one metadata field
    pub with_metadata: usize,

    /// How many rows carry each field, in column order
    pub field_counts: Vec<(&'static str, usize)>,
}

impl OutputStatistics {
    pub fn without_metadata(&self) -> usize {
        self.total_rows - self.with_metadata
    }

    /// Share of rows with metadata, in percent
    pub fn success_rate(&self) -> f64 {
        if self.total_rows == 0 {
            return 0.0;
        }
        (self.with_metadata as f64 / self.total_rows as f64) * 100.0
    }
}

/// Computes statistics over a set of rows
pub fn compute_statistics(rows: &[Record]) -> OutputStatistics {
    let count = |present: fn(&Record) -> bool| rows.iter().filter(|r| present(r)).count();

    let field_counts = vec![
        ("upload_date", count(|r| r.upload_date.is_some())),
        ("votes_up", count(|r| r.votes_up.is_some())),
        ("views", count(|r| r.views.is_some())),
        ("categories", count(|r| !r.categories.is_empty())),
        ("tags", count(|r| !r.tags.is_empty())),
        ("title", count(|r| r.title.is_some())),
    ];

    OutputStatistics {
        total_rows: rows.len(),
        unique_urls: rows.iter().map(|r| r.url.as_str()).collect::<HashSet<_>>().len(),
        with_metadata: count(Record::has_metadata),
        field_counts,
    }
}

/// Loads the output table and computes its statistics
///
/// # Returns
///
/// * `Ok(OutputStatistics)` - Statistics (all zero for a missing table)
/// * `Err(StorageError)` - The table exists but could not be read
pub fn load_statistics(store: &CsvStore) -> StorageResult<OutputStatistics> {
    Ok(compute_statistics(&store.load()?))
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &OutputStatistics) {
    println!("=== Output Statistics ===\n");

    println!("Overview:");
    println!("  Total rows: {}", stats.total_rows);
    println!("  Unique URLs: {}", stats.unique_urls);
    println!("  Rows with metadata: {}", stats.with_metadata);
    println!("  Rows with no metadata: {}", stats.without_metadata());
    println!();

    println!("Fields:");
    for (field, count) in &stats.field_counts {
        let percentage = if stats.total_rows > 0 {
            (*count as f64 / stats.total_rows as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", field, count, percentage);
    }
    println!();

    if stats.unique_urls < stats.total_rows {
        println!(
            "Duplicate rows: {} (merged on the next run)",
            stats.total_rows - stats.unique_urls
        );
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} rows with metadata)",
        stats.success_rate(),
        stats.with_metadata,
        stats.total_rows
    );
}
