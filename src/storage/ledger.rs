//! Resume and retry bookkeeping over the output store
//!
//! Both computations are pure functions of the current store contents. A URL
//! is *done* once any of its rows carries at least one metadata field; a URL
//! has *failed* when it has rows but none of them carry metadata.

use crate::crawler::Record;
use std::collections::HashSet;

/// URLs with at least one row carrying metadata
pub fn done_urls(rows: &[Record]) -> HashSet<&str> {
    rows.iter()
        .filter(|row| row.has_metadata())
        .map(|row| row.url.as_str())
        .collect()
}

/// Computes the work set: input URLs that are not done yet
///
/// Keeps input order and drops repeated input URLs.
///
/// # Arguments
///
/// * `all_urls` - Every URL from the input list
/// * `rows` - The current contents of the output store
pub fn pending(all_urls: &[String], rows: &[Record]) -> Vec<String> {
    let done = done_urls(rows);
    let mut seen = HashSet::new();

    all_urls
        .iter()
        .filter(|url| !done.contains(url.as_str()))
        .filter(|url| seen.insert(url.as_str()))
        .cloned()
        .collect()
}

/// URLs present in the store whose rows all lack metadata
///
/// Returned once each, in order of first appearance.
pub fn failed(rows: &[Record]) -> Vec<String> {
    let done = done_urls(rows);
    let mut seen = HashSet::new();

    rows.iter()
        .map(|row| row.url.as_str())
        .filter(|url| !done.contains(url))
        .filter(|url| seen.insert(*url))
        .map(str::to_string)
        .collect()
}
