//! Domain DTOs for the Reader API.
//!
//! # Design
//! These types mirror the mock-server's schema but are defined independently;
//! integration tests catch any drift between the two crates. `Location` and
//! `Category` are closed enums: wire strings convert at the boundary and an
//! unknown value is rejected with `ApiError::Validation` instead of flowing
//! through as a free string.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ApiError;

/// Reading-queue bucket of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    New,
    Later,
    Shortlist,
    Archive,
    Feed,
}

impl Location {
    pub const ALL: [Location; 5] = [
        Location::New,
        Location::Later,
        Location::Shortlist,
        Location::Archive,
        Location::Feed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Location::New => "new",
            Location::Later => "later",
            Location::Shortlist => "shortlist",
            Location::Archive => "archive",
            Location::Feed => "feed",
        }
    }

    /// Whether a document can be moved here through the update endpoint.
    pub fn is_move_target(&self) -> bool {
        matches!(self, Location::New | Location::Later | Location::Archive)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Location::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| invalid_value("location", s, &Location::ALL.map(|l| l.as_str())))
    }
}

/// Kind of content a document holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Article,
    Email,
    Rss,
    Highlight,
    Note,
    Pdf,
    Epub,
    Tweet,
    Video,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Article,
        Category::Email,
        Category::Rss,
        Category::Highlight,
        Category::Note,
        Category::Pdf,
        Category::Epub,
        Category::Tweet,
        Category::Video,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Article => "article",
            Category::Email => "email",
            Category::Rss => "rss",
            Category::Highlight => "highlight",
            Category::Note => "note",
            Category::Pdf => "pdf",
            Category::Epub => "epub",
            Category::Tweet => "tweet",
            Category::Video => "video",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| invalid_value("category", s, &Category::ALL.map(|c| c.as_str())))
    }
}

fn invalid_value(field: &str, value: &str, allowed: &[&str]) -> ApiError {
    ApiError::Validation(format!(
        "parameter '{field}' cannot be of value {value:?}, expected one of: {}",
        allowed.join(", ")
    ))
}

/// A tag attached to a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Creation time in epoch milliseconds.
    pub created: i64,
}

/// `published_date` arrives either as epoch milliseconds or as a date string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PublishedDate {
    Timestamp(i64),
    Text(String),
}

/// A single document saved in Reader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    pub category: Category,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: BTreeMap<String, Tag>,
    #[serde(default)]
    pub site_name: Option<String>,
    #[serde(default)]
    pub word_count: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub published_date: Option<PublishedDate>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    /// Only present when the list request asked for `withHtmlContent`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_content: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    /// Id of the document this one belongs to (e.g. a highlight's article).
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_moved_at: Option<DateTime<Utc>>,
    /// Fraction in `0.0..=1.0`.
    #[serde(default)]
    pub reading_progress: Option<f64>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, Tag>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

/// One page of a list response.
///
/// `next_page_cursor` is absent on the final page; otherwise it is passed
/// verbatim as `pageCursor` on the following request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListPage {
    pub count: u64,
    #[serde(rename = "nextPageCursor", default)]
    pub next_page_cursor: Option<String>,
    pub results: Vec<Document>,
}

/// Filters for the list endpoint.
///
/// With `limit` set, listing fetches exactly one page of at most `limit`
/// documents. Without it, every page is followed until the server stops
/// returning a cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    pub id: Option<String>,
    pub url: Option<String>,
    pub location: Option<Location>,
    pub category: Option<Category>,
    pub updated_after: Option<DateTime<Utc>>,
    pub tag: Option<String>,
    /// Page size, `1..=100`.
    pub limit: Option<u32>,
    /// Start from this cursor instead of the first page.
    pub page_cursor: Option<String>,
    pub with_html_content: bool,
    pub with_raw_source_url: bool,
}

impl ListFilter {
    pub fn by_id(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::default()
        }
    }

    pub fn by_url(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            ..Self::default()
        }
    }
}

/// Request payload for saving a new document.
///
/// Exactly one of `url` and `html` must be set, and `should_clean_html` is
/// only meaningful alongside `html`. `ReaderClient::build_save_document`
/// enforces both before serializing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should_clean_html: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// ISO 8601, UTC when no offset is given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_using: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl SaveRequest {
    pub fn from_url(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            ..Self::default()
        }
    }

    pub fn from_html(html: &str) -> Self {
        Self {
            html: Some(html.to_string()),
            ..Self::default()
        }
    }
}

/// Response to a save: the document id and its Reader URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaveResult {
    pub id: String,
    pub url: String,
    /// `true` for 201, `false` when the server already had the document (200).
    #[serde(skip)]
    pub created: bool,
}

/// Body of a location update. The id travels in the path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateRequest {
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateResult {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Body of a delete. The id is repeated in the path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteRequest {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResult {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

/// What to delete: a known id, or a URL that is resolved to an id first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    Id(String),
    Url(String),
}
