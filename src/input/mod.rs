//! Input URL list
//!
//! The URL list is a delimited text file with a header row. Single-byte
//! delimiters go through the `csv` reader, which also understands quoting.
//! Longer delimiters (such as `‽`) are split line by line.

use crate::config::InputConfig;
use crate::InputError;
use std::fs::File;
use std::io::{BufRead, BufReader};

/// Reads the URL column of the configured input file
///
/// Values are trimmed and empty ones skipped. File order and repeated URLs
/// are kept.
pub fn read_urls(config: &InputConfig) -> Result<Vec<String>, InputError> {
    let file = File::open(&config.path)?;
    let urls = parse_urls(
        BufReader::new(file),
        &config.delimiter,
        &config.url_column,
        config.limit,
    )?;

    tracing::info!("Read {} URLs from {}", urls.len(), config.path.display());
    Ok(urls)
}

/// Parses the URL column out of delimited text
///
/// # Arguments
///
/// * `reader` - Source of the delimited text, header row first
/// * `delimiter` - Field separator
/// * `column` - Header name of the URL column
/// * `limit` - Only look at the first `limit` data rows
pub fn parse_urls<R: BufRead>(
    reader: R,
    delimiter: &str,
    column: &str,
    limit: Option<usize>,
) -> Result<Vec<String>, InputError> {
    let limit = limit.unwrap_or(usize::MAX);
    match delimiter.as_bytes() {
        [byte] => parse_with_csv(reader, *byte, column, limit),
        _ => parse_with_splitter(reader, delimiter, column, limit),
    }
}

fn parse_with_csv<R: BufRead>(
    reader: R,
    delimiter: u8,
    column: &str,
    limit: usize,
) -> Result<Vec<String>, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?;
    if headers.is_empty() {
        return Err(InputError::Empty);
    }
    let index = column_index(headers.iter(), column)?;

    let mut urls = Vec::new();
    for record in reader.records().take(limit) {
        let record = record?;
        if let Some(url) = record.get(index).and_then(clean) {
            urls.push(url);
        }
    }

    Ok(urls)
}

fn parse_with_splitter<R: BufRead>(
    reader: R,
    delimiter: &str,
    column: &str,
    limit: usize,
) -> Result<Vec<String>, InputError> {
    let mut lines = reader.lines();
    let header = match lines.next() {
        Some(line) => line?,
        None => return Err(InputError::Empty),
    };
    let index = column_index(header.split(delimiter), column)?;

    let mut urls = Vec::new();
    for line in lines.take(limit) {
        let line = line?;
        if let Some(url) = line.split(delimiter).nth(index).and_then(clean) {
            urls.push(url);
        }
    }

    Ok(urls)
}

fn column_index<'a>(
    mut headers: impl Iterator<Item = &'a str>,
    column: &str,
) -> Result<usize, InputError> {
    headers
        .position(|h| h.trim().trim_start_matches('\u{feff}') == column)
        .ok_or_else(|| InputError::MissingColumn(column.to_string()))
}

fn clean(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
