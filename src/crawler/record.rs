//! Metadata record for one URL

use chrono::NaiveDate;

/// Metadata extracted for one URL
///
/// Every field is independently optional. An absent field means either that
/// the page did not carry the value or that the page could not be fetched;
/// the persisted output does not distinguish the two.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    pub url: String,
    pub upload_date: Option<NaiveDate>,
    pub votes_up: Option<u64>,
    pub views: Option<u64>,
    /// In page order
    pub categories: Vec<String>,
    /// In page order
    pub tags: Vec<String>,
    pub title: Option<String>,
}

impl Record {
    /// Creates a record with every field absent
    pub fn empty(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Returns true if at least one metadata field is present
    ///
    /// Empty category and tag lists count as absent, matching how they
    /// round-trip through the output table.
    pub fn has_metadata(&self) -> bool {
        self.upload_date.is_some()
            || self.votes_up.is_some()
            || self.views.is_some()
            || !self.categories.is_empty()
            || !self.tags.is_empty()
            || self.title.is_some()
    }

    /// Fills every absent field of `self` from `other`
    ///
    /// Fields already present in `self` are never replaced, even when
    /// `other` carries a different value.
    pub fn fill_from(&mut self, other: &Record) {
        if self.upload_date.is_none() {
            self.upload_date = other.upload_date;
        }
        if self.votes_up.is_none() {
            self.votes_up = other.votes_up;
        }
        if self.views.is_none() {
            self.views = other.views;
        }
        if self.categories.is_empty() {
            self.categories = other.categories.clone();
        }
        if self.tags.is_empty() {
            self.tags = other.tags.clone();
        }
        if self.title.is_none() {
            self.title = other.title.clone();
        }
    }
}
