use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const LOCATIONS: [&str; 5] = ["new", "later", "shortlist", "archive", "feed"];
pub const CATEGORIES: [&str; 9] = [
    "article", "email", "rss", "highlight", "note", "pdf", "epub", "tweet", "video",
];
pub const DEFAULT_TOKEN: &str = "test-token";
pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub created: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub url: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub source: Option<String>,
    pub category: String,
    pub location: Option<String>,
    pub tags: BTreeMap<String, Tag>,
    pub site_name: Option<String>,
    pub word_count: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub published_date: Option<String>,
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_content: Option<String>,
    pub source_url: Option<String>,
    pub parent_id: Option<String>,
    pub saved_at: DateTime<Utc>,
    pub last_moved_at: DateTime<Utc>,
    pub reading_progress: Option<f64>,
}

impl Document {
    /// A fresh article in `new` with every optional field empty.
    pub fn new(id: &str, url: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            url: url.to_string(),
            title: None,
            author: None,
            source: None,
            category: "article".to_string(),
            location: Some("new".to_string()),
            tags: BTreeMap::new(),
            site_name: None,
            word_count: None,
            created_at: now,
            updated_at: now,
            notes: None,
            published_date: None,
            summary: None,
            image_url: None,
            content: None,
            html_content: None,
            source_url: Some(url.to_string()),
            parent_id: None,
            saved_at: now,
            last_moved_at: now,
            reading_progress: Some(0.0),
        }
    }

    pub fn with_location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn with_tag(mut self, name: &str) -> Self {
        let tag = Tag {
            name: name.to_string(),
            kind: "manual".to_string(),
            created: self.created_at.timestamp_millis(),
        };
        self.tags.insert(name.to_string(), tag);
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }

    fn reader_url(&self) -> String {
        format!("https://read.readwise.io/new/read/{}", self.id)
    }
}

#[derive(Serialize, Deserialize)]
pub struct ListPage {
    pub count: usize,
    #[serde(rename = "nextPageCursor")]
    pub next_page_cursor: Option<String>,
    pub results: Vec<Document>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub id: Option<String>,
    pub url: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub updated_after: Option<String>,
    pub tag: Option<String>,
    pub limit: Option<usize>,
    pub page_cursor: Option<String>,
    pub with_html_content: Option<bool>,
}

#[derive(Deserialize)]
pub struct SaveDocument {
    pub url: Option<String>,
    pub html: Option<String>,
    pub should_clean_html: Option<bool>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub published_date: Option<String>,
    pub image_url: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub saved_using: Option<String>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateDocument {
    pub location: String,
}

/// Upcoming requests to answer with 429 before serving normally again.
#[derive(Clone, Debug, Default)]
pub struct Throttle {
    pub remaining: usize,
    pub retry_after_secs: u64,
}

#[derive(Debug)]
pub struct MockState {
    pub token: String,
    pub documents: Vec<Document>,
    pub page_size: usize,
    pub throttle: Throttle,
    /// Every request received, throttled or not.
    pub requests: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            token: DEFAULT_TOKEN.to_string(),
            documents: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            throttle: Throttle::default(),
            requests: 0,
        }
    }
}

pub type Db = Arc<RwLock<MockState>>;

pub fn shared(state: MockState) -> Db {
    Arc::new(RwLock::new(state))
}

pub fn app() -> Router {
    app_with_state(shared(MockState::default()))
}

pub fn app_with_state(db: Db) -> Router {
    Router::new()
        .route("/api/v3/list/", get(list_documents))
        .route("/api/v3/save/", post(save_document))
        .route("/api/v3/update/{id}/", patch(update_document))
        .route("/api/v3/delete/{id}/", delete(delete_document))
        .route("/api/v2/auth/", get(check_auth))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, shared(MockState::default())).await
}

pub async fn run_with_state(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!("Mock Reader API listening on {addr}");
    }
    axum::serve(listener, app_with_state(db)).await
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

/// Count the request, then apply scripted throttling and the token check.
async fn gate(db: &Db, headers: &HeaderMap) -> Result<(), Response> {
    let mut state = db.write().await;
    state.requests += 1;

    if state.throttle.remaining > 0 {
        state.throttle.remaining -= 1;
        let secs = state.throttle.retry_after_secs;
        debug!("Throttling request, retry after {secs}s");
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, secs.to_string())],
            Json(json!({ "detail": "Request was throttled." })),
        )
            .into_response());
    }

    let expected = format!("Token {}", state.token);
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if presented != Some(expected.as_str()) {
        return Err(detail(StatusCode::UNAUTHORIZED, "Invalid token."));
    }
    Ok(())
}

fn matches(doc: &Document, params: &ListParams, updated_after: Option<DateTime<Utc>>) -> bool {
    if params.id.as_ref().is_some_and(|id| &doc.id != id) {
        return false;
    }
    if let Some(url) = &params.url {
        if &doc.url != url && doc.source_url.as_ref() != Some(url) {
            return false;
        }
    }
    if params.location.is_some() && doc.location != params.location {
        return false;
    }
    if params.category.as_ref().is_some_and(|c| &doc.category != c) {
        return false;
    }
    if updated_after.is_some_and(|after| doc.updated_at <= after) {
        return false;
    }
    if params.tag.as_ref().is_some_and(|t| !doc.tags.contains_key(t)) {
        return false;
    }
    true
}

async fn list_documents(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<ListPage>, Response> {
    gate(&db, &headers).await?;

    if let Some(location) = &params.location {
        if !LOCATIONS.contains(&location.as_str()) {
            return Err(detail(StatusCode::BAD_REQUEST, "Invalid location."));
        }
    }
    if let Some(category) = &params.category {
        if !CATEGORIES.contains(&category.as_str()) {
            return Err(detail(StatusCode::BAD_REQUEST, "Invalid category."));
        }
    }
    let updated_after = match &params.updated_after {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|_| detail(StatusCode::BAD_REQUEST, "Invalid updatedAfter."))?
                .with_timezone(&Utc),
        ),
        None => None,
    };
    let offset = match &params.page_cursor {
        Some(cursor) => cursor
            .parse::<usize>()
            .map_err(|_| detail(StatusCode::BAD_REQUEST, "Invalid pageCursor."))?,
        None => 0,
    };

    let state = db.read().await;
    let page_size = match params.limit {
        Some(limit) if !(1..=100).contains(&limit) => {
            return Err(detail(StatusCode::BAD_REQUEST, "Invalid limit."))
        }
        Some(limit) => limit,
        None => state.page_size,
    };

    let matching: Vec<&Document> = state
        .documents
        .iter()
        .filter(|doc| matches(doc, &params, updated_after))
        .collect();
    let with_html = params.with_html_content.unwrap_or(false);
    let results: Vec<Document> = matching
        .iter()
        .skip(offset)
        .take(page_size)
        .map(|doc| {
            let mut doc = (*doc).clone();
            if !with_html {
                doc.html_content = None;
            }
            doc
        })
        .collect();
    let end = offset + results.len();
    let next_page_cursor = (end < matching.len()).then(|| end.to_string());

    Ok(Json(ListPage {
        count: matching.len(),
        next_page_cursor,
        results,
    }))
}

async fn save_document(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<SaveDocument>,
) -> Result<Response, Response> {
    gate(&db, &headers).await?;

    if input.url.is_none() && input.html.is_none() {
        return Err(detail(StatusCode::BAD_REQUEST, "Either url or html is required."));
    }
    if input.location.as_ref().is_some_and(|l| !LOCATIONS.contains(&l.as_str())) {
        return Err(detail(StatusCode::BAD_REQUEST, "Invalid location."));
    }
    if input.category.as_ref().is_some_and(|c| !CATEGORIES.contains(&c.as_str())) {
        return Err(detail(StatusCode::BAD_REQUEST, "Invalid category."));
    }

    let mut state = db.write().await;
    if let Some(url) = &input.url {
        if let Some(existing) = state.documents.iter().find(|d| &d.url == url) {
            let body = json!({ "id": existing.id, "url": existing.reader_url() });
            return Ok((StatusCode::OK, Json(body)).into_response());
        }
    }

    let id = Uuid::new_v4().simple().to_string();
    let url = input
        .url
        .clone()
        .unwrap_or_else(|| format!("https://readwise.io/generated/{id}"));
    let mut doc = Document::new(&id, &url);
    doc.title = input.title;
    doc.author = input.author;
    doc.summary = input.summary;
    doc.published_date = input.published_date;
    doc.image_url = input.image_url;
    doc.notes = input.notes;
    doc.source = input.saved_using;
    doc.html_content = input.html;
    if input.should_clean_html == Some(true) {
        doc.content = doc.html_content.clone();
    }
    if let Some(location) = input.location {
        doc.location = Some(location);
    }
    if let Some(category) = input.category {
        doc.category = category;
    }
    for tag in input.tags.unwrap_or_default() {
        doc = doc.with_tag(&tag);
    }

    let body = json!({ "id": doc.id, "url": doc.reader_url() });
    state.documents.push(doc);
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

async fn update_document(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<UpdateDocument>,
) -> Result<Json<serde_json::Value>, Response> {
    gate(&db, &headers).await?;

    if !LOCATIONS.contains(&input.location.as_str()) {
        return Err(detail(StatusCode::BAD_REQUEST, "Invalid location."));
    }
    let mut state = db.write().await;
    let doc = state
        .documents
        .iter_mut()
        .find(|d| d.id == id)
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Not found."))?;
    let now = Utc::now();
    doc.location = Some(input.location);
    doc.updated_at = now;
    doc.last_moved_at = now;
    Ok(Json(json!({ "id": doc.id, "url": doc.reader_url() })))
}

async fn delete_document(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, Response> {
    gate(&db, &headers).await?;

    let mut state = db.write().await;
    let before = state.documents.len();
    state.documents.retain(|d| d.id != id);
    if state.documents.len() == before {
        return Err(detail(StatusCode::NOT_FOUND, "Not found."));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn check_auth(State(db): State<Db>, headers: HeaderMap) -> Result<StatusCode, Response> {
    gate(&db, &headers).await?;
    Ok(StatusCode::NO_CONTENT)
}
