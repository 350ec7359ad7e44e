//! JSON rendering for command output.

use chrono::{DateTime, Utc};
use readwise_core::{Category, Document};
use serde::Serialize;

/// The fields `list` prints for each document.
#[derive(Debug, Serialize, PartialEq)]
pub struct DocumentSummary<'a> {
    pub title: Option<&'a str>,
    pub id: &'a str,
    pub category: Category,
    pub author: Option<&'a str>,
    pub source: Option<&'a str>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reading_progress: Option<f64>,
}

impl<'a> From<&'a Document> for DocumentSummary<'a> {
    fn from(doc: &'a Document) -> Self {
        Self {
            title: doc.title.as_deref(),
            id: &doc.id,
            category: doc.category,
            author: doc.author.as_deref(),
            source: doc.source.as_deref(),
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            reading_progress: doc.reading_progress,
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
