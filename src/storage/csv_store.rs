//! CSV output store
//!
//! The output table is the sole record of what has been processed. Batches
//! are appended to it as they complete; a retry pass writes to a side table
//! which is then merged back and removed.

use crate::crawler::Record;
use crate::storage::traits::{BatchSink, StorageError, StorageResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Column order of the output table
pub const COLUMNS: [&str; 7] = [
    "url",
    "upload_date",
    "votes_up",
    "views",
    "categories",
    "tags",
    "title",
];

/// Separator for list-valued columns
const LIST_SEPARATOR: char = ';';

/// One row of the output table as it appears on disk
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    url: String,
    upload_date: Option<NaiveDate>,
    votes_up: Option<u64>,
    views: Option<u64>,
    categories: Option<String>,
    tags: Option<String>,
    title: Option<String>,
}

impl From<&Record> for CsvRow {
    fn from(record: &Record) -> Self {
        Self {
            url: record.url.clone(),
            upload_date: record.upload_date,
            votes_up: record.votes_up,
            views: record.views,
            categories: Some(join_list(&record.categories)),
            tags: Some(join_list(&record.tags)),
            title: record.title.clone(),
        }
    }
}

impl From<CsvRow> for Record {
    fn from(row: CsvRow) -> Self {
        Self {
            url: row.url,
            upload_date: row.upload_date,
            votes_up: row.votes_up,
            views: row.views,
            categories: split_list(row.categories.as_deref()),
            tags: split_list(row.tags.as_deref()),
            title: row.title.filter(|t| !t.is_empty()),
        }
    }
}

/// Joins a list column; an empty list becomes an empty string
///
/// Items are not escaped, so an item that itself contains `;` reads back as
/// two items.
fn join_list(items: &[String]) -> String {
    items.join(&LIST_SEPARATOR.to_string())
}

/// Splits a list column on `;`, dropping empty items
///
/// The inverse of [`join_list`] only for items free of `;`.
fn split_list(cell: Option<&str>) -> Vec<String> {
    match cell {
        Some(cell) if !cell.is_empty() => cell
            .split(LIST_SEPARATOR)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Output table backed by a CSV file
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Loads every row, in file order
    ///
    /// A missing file is an empty store. Rows cut short by a crash mid-write
    /// load with their missing trailing fields absent.
    pub fn load(&self) -> StorageResult<Vec<Record>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| StorageError::csv(&self.path, e))?;

        let mut records = Vec::new();
        for row in reader.deserialize::<CsvRow>() {
            let row = row.map_err(|e| StorageError::csv(&self.path, e))?;
            if row.url.trim().is_empty() {
                continue;
            }
            records.push(Record::from(row));
        }

        Ok(records)
    }

    /// Appends a batch of records
    ///
    /// The header is written only when the file is new or empty. The whole
    /// batch goes out in one write followed by an fsync, so a crash loses at
    /// most this batch and never damages earlier ones.
    pub fn append_batch(&self, records: &[Record]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let existing_len = match std::fs::metadata(&self.path) {
            Ok(meta) if meta.len() > 0 => self.drop_torn_row(meta.len())?,
            _ => 0,
        };

        let mut buffer = Vec::new();
        if existing_len > 0 && !self.ends_with_newline(existing_len)? {
            buffer.push(b'\n');
        }
        buffer.extend(encode_rows(records, existing_len == 0, &self.path)?);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StorageError::io(&self.path, e))?;
        file.write_all(&buffer)
            .and_then(|()| file.sync_all())
            .map_err(|e| StorageError::io(&self.path, e))?;

        tracing::debug!("Appended {} rows to {}", records.len(), self.path.display());
        Ok(())
    }

    /// Replaces the whole table with `records`
    ///
    /// Writes a sibling temporary file and renames it over the table, so
    /// readers see either the old or the new content.
    pub fn replace_all(&self, records: &[Record]) -> StorageResult<()> {
        let tmp_path = self.temp_path();
        let buffer = encode_rows(records, true, &tmp_path)?;

        let mut file = File::create(&tmp_path).map_err(|e| StorageError::io(&tmp_path, e))?;
        file.write_all(&buffer)
            .and_then(|()| file.sync_all())
            .map_err(|e| StorageError::io(&tmp_path, e))?;
        drop(file);

        std::fs::rename(&tmp_path, &self.path).map_err(|e| StorageError::io(&self.path, e))
    }

    /// Deletes the backing file if present
    pub fn remove(&self) -> StorageResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&self.path, e)),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "output.csv".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Cuts off a last row left incomplete by an interrupted write
    ///
    /// Every complete batch ends in a record terminator, so a table that
    /// does not end in `\n` has a torn last row. That row is removed whole;
    /// its URL is still pending and gets fetched again. Returns the new
    /// length of the table.
    fn drop_torn_row(&self, len: u64) -> StorageResult<u64> {
        if self.ends_with_newline(len)? {
            return Ok(len);
        }

        let start = self.last_record_start()?;
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| StorageError::io(&self.path, e))?;
        file.set_len(start)
            .and_then(|()| file.sync_all())
            .map_err(|e| StorageError::io(&self.path, e))?;

        tracing::warn!(
            "Dropped incomplete last row of {} ({} bytes)",
            self.path.display(),
            len - start
        );
        Ok(start)
    }

    /// Byte offset where the last record of the table begins
    ///
    /// Parsed with the csv reader so quoted fields spanning lines are not
    /// mistaken for record boundaries.
    fn last_record_start(&self) -> StorageResult<u64> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| StorageError::csv(&self.path, e))?;

        let mut record = csv::ByteRecord::new();
        let mut last_start = 0;
        loop {
            let start = reader.position().byte();
            let more = reader
                .read_byte_record(&mut record)
                .map_err(|e| StorageError::csv(&self.path, e))?;
            if !more {
                break;
            }
            last_start = start;
        }

        Ok(last_start)
    }

    fn ends_with_newline(&self, len: u64) -> StorageResult<bool> {
        let mut file = File::open(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1))
            .and_then(|_| file.read_exact(&mut last))
            .map_err(|e| StorageError::io(&self.path, e))?;
        Ok(last[0] == b'\n')
    }
}

impl BatchSink for CsvStore {
    fn persist(&mut self, records: &[Record]) -> StorageResult<()> {
        self.append_batch(records)
    }
}

/// Serializes rows (optionally preceded by the header) into one buffer
fn encode_rows(records: &[Record], with_header: bool, path: &Path) -> StorageResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    if with_header {
        writer
            .write_record(COLUMNS)
            .map_err(|e| StorageError::csv(path, e))?;
    }
    for record in records {
        writer
            .serialize(CsvRow::from(record))
            .map_err(|e| StorageError::csv(path, e))?;
    }

    writer
        .into_inner()
        .map_err(|e| StorageError::io(path, e.into_error()))
}

/// Merges `retry` into `main`, keyed by URL
///
/// - Each URL appears once in the result, at the position of its first row
///   in `main` (URLs only in `retry` follow, in retry order).
/// - A field present in an earlier row is never replaced; absent fields are
///   filled from later rows, first from duplicates within `main`, then from
///   `retry`.
pub fn merge_records(main: Vec<Record>, retry: Vec<Record>) -> Vec<Record> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<Record> = Vec::with_capacity(main.len());

    for record in main.into_iter().chain(retry) {
        match index.get(&record.url) {
            Some(&i) => merged[i].fill_from(&record),
            None => {
                index.insert(record.url.clone(), merged.len());
                merged.push(record);
            }
        }
    }

    merged
}

/// Summary of a merge of a retry table into the main table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    /// Rows read from the main table
    pub main_rows: usize,
    /// Rows read from the retry table
    pub retry_rows: usize,
    /// Rows in the merged table (one per URL)
    pub merged_rows: usize,
}

/// Merges a retry table back into the main table and discards it
///
/// Also compacts duplicate URLs in the main table, which appear when a
/// previously empty URL is fetched again. A missing retry table merges as
/// empty. The main table is replaced atomically; the retry table is only
/// deleted after that succeeds.
pub fn merge_retry(main: &CsvStore, retry: &CsvStore) -> StorageResult<MergeReport> {
    let main_rows = main.load()?;
    let retry_rows = retry.load()?;
    let report_main = main_rows.len();
    let report_retry = retry_rows.len();

    let merged = merge_records(main_rows, retry_rows);
    let report = MergeReport {
        main_rows: report_main,
        retry_rows: report_retry,
        merged_rows: merged.len(),
    };

    if main.exists() || !merged.is_empty() {
        main.replace_all(&merged)?;
    }
    retry.remove()?;

    tracing::info!(
        "Merged {} retry rows into {} ({} rows -> {} unique)",
        report.retry_rows,
        main.path().display(),
        report.main_rows,
        report.merged_rows
    );

    Ok(report)
}
