//! Storage module for persisting results
//!
//! This module handles everything written to disk during a run:
//! - The CSV output store and its incremental append / retry merge
//! - Resume and retry bookkeeping derived from the output store
//! - The append-only failure log

mod csv_store;
mod failure_log;
pub mod ledger;
mod traits;

pub use csv_store::{merge_records, merge_retry, CsvStore, MergeReport, COLUMNS};
pub use failure_log::{format_failure_line, FailureLog};
pub use ledger::{failed, pending};
pub use traits::{BatchSink, StorageError, StorageResult};
