//! HTML field extraction
//!
//! This module turns raw page markup into a [`Record`]. Each field is
//! extracted independently: a missing or malformed value for one field never
//! prevents the others from being read, and nothing here returns an error.

use crate::crawler::counts::parse_count;
use crate::crawler::record::Record;
use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

/// Upload date embedded in an inline player script
static UPLOAD_DATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'video_date_published'\s*:\s*'(\d{8})'")
        .expect("hardcoded regex pattern is valid")
});

/// Outcome of extracting a single field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    /// The value was found and parsed
    Found(T),

    /// The page does not carry this field
    Missing,

    /// The page carries the field but its value could not be parsed
    Invalid(String),
}

impl<T> Field<T> {
    /// Collapses the outcome to the persisted form, where both `Missing` and
    /// `Invalid` become absent
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::Missing | Self::Invalid(_) => None,
        }
    }

    fn from_option(value: Option<T>) -> Self {
        value.map_or(Self::Missing, Self::Found)
    }
}

/// Per-field extraction outcomes for one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub upload_date: Field<NaiveDate>,
    pub votes_up: Field<u64>,
    pub views: Field<u64>,
    pub categories: Field<Vec<String>>,
    pub tags: Field<Vec<String>>,
    pub title: Field<String>,
}

impl Extraction {
    /// An extraction in which every field is missing
    pub fn missing() -> Self {
        Self {
            upload_date: Field::Missing,
            votes_up: Field::Missing,
            views: Field::Missing,
            categories: Field::Missing,
            tags: Field::Missing,
            title: Field::Missing,
        }
    }

    /// Names of fields that were present on the page but failed to parse
    pub fn invalid_fields(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if matches!(self.upload_date, Field::Invalid(_)) {
            names.push("upload_date");
        }
        if matches!(self.votes_up, Field::Invalid(_)) {
            names.push("votes_up");
        }
        if matches!(self.views, Field::Invalid(_)) {
            names.push("views");
        }
        if matches!(self.categories, Field::Invalid(_)) {
            names.push("categories");
        }
        if matches!(self.tags, Field::Invalid(_)) {
            names.push("tags");
        }
        if matches!(self.title, Field::Invalid(_)) {
            names.push("title");
        }
        names
    }

    /// Converts the outcomes into the record persisted for `url`
    pub fn into_record(self, url: &str) -> Record {
        Record {
            url: url.to_string(),
            upload_date: self.upload_date.into_option(),
            votes_up: self.votes_up.into_option(),
            views: self.views.into_option(),
            categories: self.categories.into_option().unwrap_or_default(),
            tags: self.tags.into_option().unwrap_or_default(),
            title: self.title.into_option(),
        }
    }
}

/// Capability of turning page content into field outcomes
///
/// Implementations must be pure: no I/O, no panics on malformed markup.
pub trait FieldExtractor: Send + Sync {
    fn extract(&self, html: &str) -> Extraction;
}

/// Extractor for video pages that carry player metadata in their markup
///
/// | Field       | Source                                                   |
/// |-------------|----------------------------------------------------------|
/// | upload_date | `'video_date_published': 'YYYYMMDD'` in inline script    |
/// | votes_up    | `span.votesUp[data-rating]`                              |
/// | views       | text of `div.views span.count`                           |
/// | categories  | text of each `div.categoriesWrapper a.item`              |
/// | tags        | comma list in `meta[name=adsbytrafficjunkycontext]`      |
/// | title       | `meta[property="og:title"]`, else `<title>`              |
pub struct MarkupExtractor {
    votes: Selector,
    views: Selector,
    categories: Selector,
    tags: Selector,
    og_title: Selector,
    title: Selector,
}

impl MarkupExtractor {
    pub fn new() -> Self {
        Self {
            votes: selector("span.votesUp[data-rating]"),
            views: selector("div.views span.count"),
            categories: selector("div.categoriesWrapper a.item"),
            tags: selector(r#"meta[name="adsbytrafficjunkycontext"][data-context-tag]"#),
            og_title: selector(r#"meta[property="og:title"][content]"#),
            title: selector("title"),
        }
    }

    fn upload_date(&self, html: &str) -> Field<NaiveDate> {
        let Some(captures) = UPLOAD_DATE_REGEX.captures(html) else {
            return Field::Missing;
        };
        let raw = &captures[1];
        match NaiveDate::parse_from_str(raw, "%Y%m%d") {
            Ok(date) => Field::Found(date),
            Err(e) => Field::Invalid(format!("bad date '{}': {}", raw, e)),
        }
    }

    fn votes_up(&self, document: &Html) -> Field<u64> {
        let Some(rating) = document
            .select(&self.votes)
            .next()
            .and_then(|element| element.value().attr("data-rating"))
        else {
            return Field::Missing;
        };
        match rating.trim().parse::<u64>() {
            Ok(votes) => Field::Found(votes),
            Err(e) => Field::Invalid(format!("bad rating '{}': {}", rating, e)),
        }
    }

    fn views(&self, document: &Html) -> Field<u64> {
        let Some(element) = document.select(&self.views).next() else {
            return Field::Missing;
        };
        let text = element_text(element);
        match parse_count(&text) {
            Some(views) => Field::Found(views),
            None => Field::Invalid(format!("unparseable count '{}'", text)),
        }
    }

    fn categories(&self, document: &Html) -> Field<Vec<String>> {
        let categories: Vec<String> = document
            .select(&self.categories)
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect();

        if categories.is_empty() {
            Field::Missing
        } else {
            Field::Found(categories)
        }
    }

    fn tags(&self, document: &Html) -> Field<Vec<String>> {
        let Some(raw) = document
            .select(&self.tags)
            .next()
            .and_then(|element| element.value().attr("data-context-tag"))
        else {
            return Field::Missing;
        };

        let tags: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect();

        if tags.is_empty() {
            Field::Missing
        } else {
            Field::Found(tags)
        }
    }

    fn title(&self, document: &Html) -> Field<String> {
        let og_title = document
            .select(&self.og_title)
            .filter_map(|element| element.value().attr("content"))
            .map(|content| content.trim().to_string())
            .find(|content| !content.is_empty());

        let title = og_title.or_else(|| {
            document
                .select(&self.title)
                .next()
                .map(element_text)
                .filter(|s| !s.is_empty())
        });

        Field::from_option(title)
    }
}

impl Default for MarkupExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for MarkupExtractor {
    fn extract(&self, html: &str) -> Extraction {
        let document = Html::parse_document(html);

        Extraction {
            upload_date: self.upload_date(html),
            votes_up: self.votes_up(&document),
            views: self.views(&document),
            categories: self.categories(&document),
            tags: self.tags(&document),
            title: self.title(&document),
        }
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("hardcoded selector is valid")
}

/// Concatenated, trimmed text content of an element
fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
