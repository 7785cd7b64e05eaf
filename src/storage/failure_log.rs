//! Append-only log of URLs that ultimately failed

use crate::crawler::FetchError;
use crate::storage::traits::{StorageError, StorageResult};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Plain-text failure log, one `<url> | <kind>: <message>` line per failure
///
/// Shared by every concurrent fetch. Each line goes out in a single
/// `write_all` on an append-mode file while holding the lock, so lines from
/// concurrent failures never interleave.
pub struct FailureLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FailureLog {
    /// Opens (creating if needed) the log for appending
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| StorageError::io(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one failure line
    pub fn record(&self, url: &str, error: &FetchError) -> StorageResult<()> {
        let line = format_failure_line(url, error.kind(), &error.to_string());

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| StorageError::io(&self.path, e))
    }
}

/// Formats a failure log line, newline-terminated
///
/// Embedded line breaks in the message are flattened so one failure is
/// always exactly one line.
pub fn format_failure_line(url: &str, kind: &str, message: &str) -> String {
    let message = message.replace(['\r', '\n'], " ");
    format!("{} | {}: {}\n", url, kind, message)
}
