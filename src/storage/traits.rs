//! Storage traits and error types
//!
//! This module defines the sink interface the batch scheduler writes through
//! and the errors raised by the output store and failure log.

use crate::crawler::Record;
use thiserror::Error;

/// Errors that can occur during storage operations
///
/// Any of these is fatal for the run: the output store is the only record
/// of what has been processed.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },
}

impl StorageError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn csv(path: &std::path::Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Destination for completed batches
///
/// The scheduler calls `persist` once per batch, after every URL in it has
/// finished and before the next batch starts. Calls are never concurrent.
pub trait BatchSink {
    /// Durably records one batch of results
    ///
    /// # Arguments
    ///
    /// * `records` - The batch, in completion order
    fn persist(&mut self, records: &[Record]) -> StorageResult<()>;
}

/// In-memory sink that keeps every batch separately
impl BatchSink for Vec<Vec<Record>> {
    fn persist(&mut self, records: &[Record]) -> StorageResult<()> {
        self.push(records.to_vec());
        Ok(())
    }
}
