//! Blocking driver that runs `ReaderClient` requests over a `Transport`.
//!
//! # Design
//! `Reader` owns the loops the pure client cannot: following page cursors
//! and re-issuing a request after a 429. Both are plain loops bounded by the
//! server's data and by `RetryPolicy::max_retries`; nothing recurses. Each
//! public method issues its requests one at a time on the calling thread.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::client::{retry_after, ReaderClient};
use crate::config::{ReaderConfig, RetryPolicy};
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::types::{
    DeleteResult, DeleteTarget, Document, ListFilter, ListPage, Location, SaveRequest, SaveResult,
    UpdateResult,
};

pub struct Reader<T> {
    client: ReaderClient,
    transport: T,
    retry: RetryPolicy,
}

impl<T: Transport> Reader<T> {
    pub fn new(client: ReaderClient, transport: T) -> Self {
        Self {
            client,
            transport,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &ReaderConfig, transport: T) -> Self {
        Self {
            client: ReaderClient::from_config(config),
            transport,
            retry: config.retry,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn client(&self) -> &ReaderClient {
        &self.client
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// All matching documents in server order.
    ///
    /// With `filter.limit` set, exactly one page is fetched and at most
    /// `limit` documents come back even if the server reports a cursor.
    /// Otherwise every cursor is followed until a page arrives without one.
    pub fn list_documents(&self, filter: &ListFilter) -> Result<Vec<Document>, ApiError> {
        if let Some(limit) = filter.limit {
            let mut page = self.fetch_page(filter)?;
            page.results.truncate(limit as usize);
            return Ok(page.results);
        }

        let mut filter = filter.clone();
        let mut documents = Vec::new();
        loop {
            let page = self.fetch_page(&filter)?;
            documents.extend(page.results);
            match page.next_page_cursor {
                Some(cursor) => filter.page_cursor = Some(cursor),
                None => break,
            }
        }
        debug!("Listed {} documents", documents.len());
        Ok(documents)
    }

    /// Lazily stream matching documents, one page request at a time.
    ///
    /// `filter.limit` sets the page size here rather than a total cap.
    pub fn documents(&self, filter: &ListFilter) -> DocumentStream<'_, T> {
        DocumentStream {
            reader: self,
            filter: filter.clone(),
            buffer: VecDeque::new(),
            finished: false,
        }
    }

    /// The document with `id`, if the server reports exactly one match.
    pub fn get_document_by_id(&self, id: &str) -> Result<Option<Document>, ApiError> {
        if id.trim().is_empty() {
            return Err(ApiError::Validation("document id must not be empty".to_string()));
        }
        let page = self.fetch_page(&ListFilter::by_id(id))?;
        if page.count == 1 {
            return Ok(page.results.into_iter().next());
        }
        if page.count > 1 {
            warn!("Lookup of id {id} matched {} documents", page.count);
        }
        Ok(None)
    }

    /// The first document saved under exactly `url`.
    pub fn search_document(&self, url: &str) -> Result<Option<Document>, ApiError> {
        if url.trim().is_empty() {
            return Err(ApiError::Validation("url must not be empty".to_string()));
        }
        let page = self.fetch_page(&ListFilter::by_url(url))?;
        if page.count > 0 {
            return Ok(page.results.into_iter().next());
        }
        Ok(None)
    }

    pub fn save_document(&self, input: &SaveRequest) -> Result<SaveResult, ApiError> {
        let request = self.client.build_save_document(input)?;
        let response = self.send(&request)?;
        self.client.parse_save_document(response)
    }

    pub fn update_document_location(
        &self,
        id: &str,
        location: Location,
    ) -> Result<UpdateResult, ApiError> {
        let request = self.client.build_update_document(id, location)?;
        let response = self.send(&request)?;
        self.client.parse_update_document(response)
    }

    /// Delete by id, or resolve a URL to an id with a search first. When the
    /// search finds nothing no DELETE is issued.
    pub fn delete_document(&self, target: &DeleteTarget) -> Result<DeleteResult, ApiError> {
        let id = match target {
            DeleteTarget::Id(id) => id.clone(),
            DeleteTarget::Url(url) => match self.search_document(url)? {
                Some(document) => document.id,
                None => {
                    return Err(ApiError::NotFound(format!(
                        "could not find document with URL {url}"
                    )))
                }
            },
        };
        let request = self.client.build_delete_document(&id)?;
        let response = self.send(&request)?;
        self.client.parse_delete_document(response)
    }

    /// Probe the auth endpoint. `Ok(false)` means the token was rejected.
    pub fn validate_token(&self, token: Option<&str>) -> Result<bool, ApiError> {
        let request = self.client.build_validate_token(token)?;
        let response = self.send(&request)?;
        self.client.parse_validate_token(response)
    }

    fn fetch_page(&self, filter: &ListFilter) -> Result<ListPage, ApiError> {
        let request = self.client.build_list_documents(filter)?;
        let response = self.send(&request)?;
        let page = self.client.parse_list_documents(response)?;
        debug!(
            "Fetched page: count={}, results={}, has_next={}",
            page.count,
            page.results.len(),
            page.next_page_cursor.is_some()
        );
        Ok(page)
    }

    /// Execute `request`, re-issuing it verbatim after each 429 the retry
    /// policy allows. Every other status is returned for `parse_*`.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut retries = 0;
        loop {
            debug!("{} {}", request.method.as_str(), request.url);
            let response = self.transport.execute(request)?;
            if response.status != 429 {
                return Ok(response);
            }

            let wait = retry_after(&response);
            if !self.retry.allows(retries) {
                return Err(ApiError::RateLimited { retry_after: wait });
            }
            warn!("Rate limited, waiting for {} seconds...", wait.as_secs());
            self.transport.pause(wait);
            retries = retries.saturating_add(1);
        }
    }
}

/// Iterator returned by `Reader::documents`.
///
/// Yields buffered documents and fetches the next page only once the buffer
/// is empty. The first error is yielded and ends the stream.
pub struct DocumentStream<'a, T> {
    reader: &'a Reader<T>,
    filter: ListFilter,
    buffer: VecDeque<Document>,
    finished: bool,
}

impl<T: Transport> Iterator for DocumentStream<'_, T> {
    type Item = Result<Document, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(document) = self.buffer.pop_front() {
                return Some(Ok(document));
            }
            if self.finished {
                return None;
            }
            match self.reader.fetch_page(&self.filter) {
                Ok(page) => {
                    match page.next_page_cursor {
                        Some(cursor) => self.filter.page_cursor = Some(cursor),
                        None => self.finished = true,
                    }
                    self.buffer.extend(page.results);
                }
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::time::Duration;

    use super::*;
    use crate::http::HttpMethod;

    /// Replays canned responses in order and records what was asked of it.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: RefCell<VecDeque<HttpResponse>>,
        requests: RefCell<Vec<HttpRequest>>,
        pauses: RefCell<Vec<Duration>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<HttpResponse>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                ..Self::default()
            }
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.borrow().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
            self.requests.borrow_mut().push(request.clone());
            self.responses
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| ApiError::Transport("no scripted response left".to_string()))
        }

        fn pause(&self, duration: Duration) {
            self.pauses.borrow_mut().push(duration);
        }
    }

    fn doc_json(id: &str) -> String {
        format!(
            r#"{{"id":"{id}","url":"https://example.com/{id}","category":"article","location":"new",
               "created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"}}"#
        )
    }

    fn page(count: u64, cursor: Option<&str>, ids: &[&str]) -> HttpResponse {
        let results: Vec<String> = ids.iter().map(|id| doc_json(id)).collect();
        let cursor = match cursor {
            Some(c) => format!("\"{c}\""),
            None => "null".to_string(),
        };
        HttpResponse::new(
            200,
            format!(
                r#"{{"count":{count},"nextPageCursor":{cursor},"results":[{}]}}"#,
                results.join(",")
            ),
        )
    }

    fn rate_limited(secs: &str) -> HttpResponse {
        HttpResponse::new(429, "").with_header("Retry-After", secs)
    }

    fn reader(transport: &ScriptedTransport) -> Reader<&ScriptedTransport> {
        Reader::new(
            ReaderClient::new("http://localhost:3000/api/v3").with_token("test-token"),
            transport,
        )
    }

    fn ids(documents: &[Document]) -> Vec<&str> {
        documents.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn limit_fetches_exactly_one_page_despite_cursor() {
        let transport = ScriptedTransport::new(vec![page(3, Some("c1"), &["a", "b", "c"])]);
        let filter = ListFilter {
            limit: Some(2),
            ..ListFilter::default()
        };
        let documents = reader(&transport).list_documents(&filter).unwrap();
        assert_eq!(ids(&documents), vec!["a", "b"]);
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].query_param("limit"), Some("2"));
    }

    #[test]
    fn out_of_range_limit_issues_no_request() {
        for limit in [0, 101] {
            let transport = ScriptedTransport::default();
            let filter = ListFilter {
                limit: Some(limit),
                ..ListFilter::default()
            };
            let err = reader(&transport).list_documents(&filter).unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)));
            assert!(transport.requests().is_empty());
        }
    }

    #[test]
    fn auto_pagination_follows_cursors_in_order() {
        let transport = ScriptedTransport::new(vec![
            page(1, Some("c1"), &["A"]),
            page(1, Some("c2"), &["B"]),
            page(1, None, &["C"]),
        ]);
        let documents = reader(&transport)
            .list_documents(&ListFilter::default())
            .unwrap();
        assert_eq!(ids(&documents), vec!["A", "B", "C"]);

        let cursors: Vec<Option<String>> = transport
            .requests()
            .iter()
            .map(|r| r.query_param("pageCursor").map(str::to_string))
            .collect();
        assert_eq!(
            cursors,
            vec![None, Some("c1".to_string()), Some("c2".to_string())]
        );
    }

    #[test]
    fn auto_pagination_starts_from_explicit_cursor() {
        let transport = ScriptedTransport::new(vec![page(1, None, &["B"])]);
        let filter = ListFilter {
            page_cursor: Some("start".to_string()),
            ..ListFilter::default()
        };
        let documents = reader(&transport).list_documents(&filter).unwrap();
        assert_eq!(ids(&documents), vec!["B"]);
        assert_eq!(transport.requests()[0].query_param("pageCursor"), Some("start"));
    }

    #[test]
    fn auto_pagination_keeps_filters_on_every_page() {
        let transport = ScriptedTransport::new(vec![
            page(1, Some("c1"), &["A"]),
            page(1, None, &["B"]),
        ]);
        let filter = ListFilter {
            location: Some(Location::Later),
            ..ListFilter::default()
        };
        reader(&transport).list_documents(&filter).unwrap();
        for request in transport.requests() {
            assert_eq!(request.query_param("location"), Some("later"));
        }
    }

    #[test]
    fn auto_pagination_propagates_page_error() {
        let transport = ScriptedTransport::new(vec![
            page(1, Some("c1"), &["A"]),
            HttpResponse::new(502, "bad gateway"),
        ]);
        let err = reader(&transport)
            .list_documents(&ListFilter::default())
            .unwrap_err();
        assert!(matches!(err, ApiError::Server { status: 502, .. }));
    }

    #[test]
    fn stream_fetches_next_page_only_when_exhausted() {
        let transport = ScriptedTransport::new(vec![
            page(2, Some("c1"), &["A", "B"]),
            page(1, None, &["C"]),
        ]);
        let reader = reader(&transport);
        let mut stream = reader.documents(&ListFilter::default());

        assert_eq!(stream.next().unwrap().unwrap().id, "A");
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(stream.next().unwrap().unwrap().id, "B");
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(stream.next().unwrap().unwrap().id, "C");
        assert_eq!(transport.requests().len(), 2);
        assert!(stream.next().is_none());
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn stream_skips_empty_pages_with_cursor() {
        let transport = ScriptedTransport::new(vec![
            page(0, Some("c1"), &[]),
            page(1, None, &["A"]),
        ]);
        let reader = reader(&transport);
        let collected: Vec<Document> = reader
            .documents(&ListFilter::default())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(ids(&collected), vec!["A"]);
    }

    #[test]
    fn stream_ends_after_first_error() {
        let transport = ScriptedTransport::new(vec![HttpResponse::new(401, "nope")]);
        let reader = reader(&transport);
        let mut stream = reader.documents(&ListFilter::default());
        assert!(matches!(
            stream.next(),
            Some(Err(ApiError::Authentication { status: 401, .. }))
        ));
        assert!(stream.next().is_none());
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn get_by_id_requires_exactly_one_match() {
        let transport = ScriptedTransport::new(vec![page(1, None, &["doc1"])]);
        let found = reader(&transport).get_document_by_id("doc1").unwrap();
        assert_eq!(found.unwrap().id, "doc1");
        assert_eq!(transport.requests()[0].query_param("id"), Some("doc1"));

        let transport = ScriptedTransport::new(vec![page(0, None, &[])]);
        assert!(reader(&transport).get_document_by_id("doc1").unwrap().is_none());

        let transport = ScriptedTransport::new(vec![page(2, None, &["doc1", "doc1"])]);
        assert!(reader(&transport).get_document_by_id("doc1").unwrap().is_none());
    }

    #[test]
    fn search_returns_first_match() {
        let transport = ScriptedTransport::new(vec![page(2, None, &["first", "second"])]);
        let found = reader(&transport)
            .search_document("https://example.com/x")
            .unwrap();
        assert_eq!(found.unwrap().id, "first");
        assert_eq!(
            transport.requests()[0].query_param("url"),
            Some("https://example.com/x")
        );
    }

    #[test]
    fn save_validation_issues_no_request() {
        let transport = ScriptedTransport::default();
        let err = reader(&transport)
            .save_document(&SaveRequest::default())
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let input = SaveRequest {
            should_clean_html: Some(true),
            ..SaveRequest::from_url("https://example.com")
        };
        let err = reader(&transport).save_document(&input).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn save_returns_server_failure_as_error() {
        let transport = ScriptedTransport::new(vec![HttpResponse::new(
            400,
            r#"{"error":"Invalid URL format"}"#,
        )]);
        let err = reader(&transport)
            .save_document(&SaveRequest::from_url("invalid-url"))
            .unwrap_err();
        assert!(matches!(err, ApiError::Client { status: 400, .. }));
    }

    #[test]
    fn rate_limit_with_retry_waits_then_reissues_same_request() {
        let transport = ScriptedTransport::new(vec![
            rate_limited("1"),
            HttpResponse::new(201, r#"{"id":"doc789","url":"https://reader/doc789"}"#),
        ]);
        let result = reader(&transport)
            .with_retry(RetryPolicy::retrying())
            .save_document(&SaveRequest::from_url("https://example.com"))
            .unwrap();
        assert_eq!(result.id, "doc789");
        assert!(result.created);
        assert_eq!(*transport.pauses.borrow(), vec![Duration::from_secs(1)]);

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1]);
    }

    #[test]
    fn rate_limit_without_retry_surfaces_wait() {
        let transport = ScriptedTransport::new(vec![
            rate_limited("1"),
            HttpResponse::new(200, r#"{"id":"x","url":"y"}"#),
        ]);
        let err = reader(&transport)
            .save_document(&SaveRequest::from_url("https://example.com"))
            .unwrap_err();
        match err {
            ApiError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(1))
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
        assert_eq!(transport.requests().len(), 1);
        assert!(transport.pauses.borrow().is_empty());
    }

    #[test]
    fn rate_limit_retry_respects_max_retries() {
        let transport = ScriptedTransport::new(vec![
            rate_limited("2"),
            rate_limited("2"),
            rate_limited("2"),
            page(0, None, &[]),
        ]);
        let policy = RetryPolicy {
            auto_retry: true,
            max_retries: Some(2),
        };
        let err = reader(&transport)
            .with_retry(policy)
            .list_documents(&ListFilter::default())
            .unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { .. }));
        assert_eq!(transport.requests().len(), 3);
        assert_eq!(transport.pauses.borrow().len(), 2);
    }

    #[test]
    fn rate_limit_retry_applies_mid_pagination() {
        let transport = ScriptedTransport::new(vec![
            page(1, Some("c1"), &["A"]),
            rate_limited("3"),
            page(1, None, &["B"]),
        ]);
        let documents = reader(&transport)
            .with_retry(RetryPolicy::retrying())
            .list_documents(&ListFilter::default())
            .unwrap();
        assert_eq!(ids(&documents), vec!["A", "B"]);
        let requests = transport.requests();
        assert_eq!(requests[1].query_param("pageCursor"), Some("c1"));
        assert_eq!(requests[2].query_param("pageCursor"), Some("c1"));
    }

    #[test]
    fn update_location_outside_move_targets_issues_no_request() {
        let transport = ScriptedTransport::default();
        let err = reader(&transport)
            .update_document_location("doc1", Location::Feed)
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn update_location_success() {
        let transport = ScriptedTransport::new(vec![HttpResponse::new(
            200,
            r#"{"id":"doc1","url":"https://read.readwise.io/read/doc1"}"#,
        )]);
        let result = reader(&transport)
            .update_document_location("doc1", Location::Archive)
            .unwrap();
        assert!(result.success);
        assert_eq!(result.id.as_deref(), Some("doc1"));
        assert_eq!(transport.requests()[0].method, HttpMethod::Patch);
    }

    #[test]
    fn delete_by_url_without_match_skips_delete() {
        let transport = ScriptedTransport::new(vec![page(0, None, &[])]);
        let err = reader(&transport)
            .delete_document(&DeleteTarget::Url("https://example.com/gone".to_string()))
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Get);
    }

    #[test]
    fn delete_by_url_resolves_id_first() {
        let transport = ScriptedTransport::new(vec![
            page(1, None, &["doc42"]),
            HttpResponse::new(204, ""),
        ]);
        let result = reader(&transport)
            .delete_document(&DeleteTarget::Url("https://example.com/doc42".to_string()))
            .unwrap();
        assert!(result.success);
        let requests = transport.requests();
        assert_eq!(requests[1].method, HttpMethod::Delete);
        assert!(requests[1].url.ends_with("/delete/doc42/"));
        assert_eq!(requests[1].body.as_deref(), Some(r#"{"id":"doc42"}"#));
    }

    #[test]
    fn delete_with_empty_target_is_rejected() {
        let transport = ScriptedTransport::default();
        let reader = reader(&transport);
        assert!(matches!(
            reader.delete_document(&DeleteTarget::Id(String::new())),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            reader.delete_document(&DeleteTarget::Url(String::new())),
            Err(ApiError::Validation(_))
        ));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn validate_token_maps_statuses() {
        let transport = ScriptedTransport::new(vec![
            HttpResponse::new(204, ""),
            HttpResponse::new(401, ""),
            HttpResponse::new(500, "oops"),
        ]);
        let reader = reader(&transport);
        assert!(reader.validate_token(None).unwrap());
        assert!(!reader.validate_token(Some("wrong")).unwrap());
        assert!(matches!(
            reader.validate_token(None),
            Err(ApiError::UnexpectedStatus { status: 500, .. })
        ));
        assert_eq!(
            transport.requests()[1].header("authorization"),
            Some("Token wrong")
        );
    }

    #[test]
    fn transport_failure_is_propagated() {
        let transport = ScriptedTransport::default();
        let err = reader(&transport).get_document_by_id("doc1").unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
