//! Stateless HTTP request builder and response parser for the Reader API.
//!
//! # Design
//! `ReaderClient` holds only endpoint URLs and an optional token and carries
//! no mutable state between calls. Each operation is split into a `build_*`
//! method that validates input and produces an `HttpRequest`, and a
//! `parse_*` method that dispatches on status and decodes an `HttpResponse`.
//! Validation lives in `build_*`, so a rejected input never reaches a
//! transport.

use std::env;
use std::time::Duration;

use chrono::SecondsFormat;
use serde::de::DeserializeOwned;

use crate::config::{ReaderConfig, DEFAULT_AUTH_URL, DEFAULT_RETRY_AFTER, TOKEN_ENV};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{
    DeleteRequest, DeleteResult, ListFilter, ListPage, Location, SaveRequest, SaveResult,
    UpdateRequest, UpdateResult,
};

pub const MAX_PAGE_SIZE: u32 = 100;

/// Synchronous, stateless client for the Reader API.
#[derive(Debug, Clone)]
pub struct ReaderClient {
    base_url: String,
    auth_url: String,
    token: Option<String>,
}

impl ReaderClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token: None,
        }
    }

    pub fn from_config(config: &ReaderConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_url: config.auth_url.clone(),
            token: config.token.clone(),
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_auth_url(mut self, auth_url: &str) -> Self {
        self.auth_url = auth_url.to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The explicit token, or `READWISE_TOKEN` read at call time.
    pub fn token(&self) -> Result<String, ApiError> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ApiError::Config(format!(
                    "a token is required: pass one explicitly or set {TOKEN_ENV}"
                ))
            })
    }

    pub fn build_list_documents(&self, filter: &ListFilter) -> Result<HttpRequest, ApiError> {
        if let Some(limit) = filter.limit {
            if !(1..=MAX_PAGE_SIZE).contains(&limit) {
                return Err(ApiError::Validation(format!(
                    "parameter 'limit' must be between 1 and {MAX_PAGE_SIZE}, got {limit}"
                )));
            }
        }

        let mut query = Vec::new();
        let mut push = |key: &str, value: String| query.push((key.to_string(), value));
        if let Some(id) = &filter.id {
            push("id", id.clone());
        }
        if let Some(url) = &filter.url {
            push("url", url.clone());
        }
        if let Some(location) = filter.location {
            push("location", location.to_string());
        }
        if let Some(category) = filter.category {
            push("category", category.to_string());
        }
        if let Some(updated_after) = filter.updated_after {
            push(
                "updatedAfter",
                updated_after.to_rfc3339_opts(SecondsFormat::Secs, true),
            );
        }
        if let Some(tag) = &filter.tag {
            push("tag", tag.clone());
        }
        if let Some(limit) = filter.limit {
            push("limit", limit.to_string());
        }
        if let Some(cursor) = &filter.page_cursor {
            push("pageCursor", cursor.clone());
        }
        if filter.with_html_content {
            push("withHtmlContent", "true".to_string());
        }
        if filter.with_raw_source_url {
            push("withRawSourceUrl", "true".to_string());
        }

        Ok(HttpRequest {
            method: HttpMethod::Get,
            url: format!("{}/list/", self.base_url),
            query,
            headers: vec![self.auth_header(None)?],
            body: None,
        })
    }

    pub fn build_save_document(&self, input: &SaveRequest) -> Result<HttpRequest, ApiError> {
        match (&input.url, &input.html) {
            (None, None) => {
                return Err(ApiError::Validation(
                    "either 'url' or 'html' must be provided".to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(ApiError::Validation(
                    "only one of 'url' and 'html' may be provided".to_string(),
                ))
            }
            _ => {}
        }
        if input.should_clean_html == Some(true) && input.html.is_none() {
            return Err(ApiError::Validation(
                "'should_clean_html' is only valid when 'html' is provided".to_string(),
            ));
        }
        self.json_request(HttpMethod::Post, format!("{}/save/", self.base_url), input)
    }

    pub fn build_update_document(
        &self,
        id: &str,
        location: Location,
    ) -> Result<HttpRequest, ApiError> {
        require_id(id)?;
        if !location.is_move_target() {
            return Err(ApiError::Validation(format!(
                "invalid location {:?}, must be one of: 'new', 'later', 'archive'",
                location.as_str()
            )));
        }
        self.json_request(
            HttpMethod::Patch,
            format!("{}/update/{id}/", self.base_url),
            &UpdateRequest { location },
        )
    }

    pub fn build_delete_document(&self, id: &str) -> Result<HttpRequest, ApiError> {
        require_id(id)?;
        self.json_request(
            HttpMethod::Delete,
            format!("{}/delete/{id}/", self.base_url),
            &DeleteRequest { id: id.to_string() },
        )
    }

    /// Auth probe against the separate auth endpoint. `token` overrides the
    /// configured one for this request only.
    pub fn build_validate_token(&self, token: Option<&str>) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest {
            method: HttpMethod::Get,
            url: self.auth_url.clone(),
            query: Vec::new(),
            headers: vec![self.auth_header(token)?],
            body: None,
        })
    }

    pub fn parse_list_documents(&self, response: HttpResponse) -> Result<ListPage, ApiError> {
        check_status(&response, is_2xx)?;
        let mut page: ListPage = decode(&response.body)?;
        if page.next_page_cursor.as_deref() == Some("") {
            page.next_page_cursor = None;
        }
        Ok(page)
    }

    pub fn parse_save_document(&self, response: HttpResponse) -> Result<SaveResult, ApiError> {
        check_status(&response, |s| s == 200 || s == 201)?;
        let mut result: SaveResult = decode(&response.body)?;
        result.created = response.status == 201;
        Ok(result)
    }

    pub fn parse_update_document(&self, response: HttpResponse) -> Result<UpdateResult, ApiError> {
        check_status(&response, is_2xx)?;
        decode(&response.body)
    }

    pub fn parse_delete_document(&self, response: HttpResponse) -> Result<DeleteResult, ApiError> {
        check_status(&response, |s| s == 200 || s == 204)?;
        if response.status == 204 {
            return Ok(DeleteResult {
                success: true,
                message: None,
            });
        }
        decode(&response.body)
    }

    /// 204 means the token is valid and 401/403 means it is not. Any other
    /// status means the server contract changed.
    pub fn parse_validate_token(&self, response: HttpResponse) -> Result<bool, ApiError> {
        match response.status {
            204 => Ok(true),
            401 | 403 => Ok(false),
            429 => Err(ApiError::RateLimited {
                retry_after: retry_after(&response),
            }),
            status => Err(ApiError::UnexpectedStatus {
                status,
                body: response.body,
            }),
        }
    }

    fn auth_header(&self, token: Option<&str>) -> Result<(String, String), ApiError> {
        let token = match token {
            Some(token) => token.to_string(),
            None => self.token()?,
        };
        Ok(("authorization".to_string(), format!("Token {token}")))
    }

    fn json_request<B: serde::Serialize>(
        &self,
        method: HttpMethod,
        url: String,
        input: &B,
    ) -> Result<HttpRequest, ApiError> {
        let body =
            serde_json::to_string(input).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(HttpRequest {
            method,
            url,
            query: Vec::new(),
            headers: vec![
                self.auth_header(None)?,
                ("content-type".to_string(), "application/json".to_string()),
            ],
            body: Some(body),
        })
    }
}

/// The wait a 429 asks for, from `Retry-After` in whole seconds.
pub fn retry_after(response: &HttpResponse) -> Duration {
    response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

fn is_2xx(status: u16) -> bool {
    (200..300).contains(&status)
}

fn require_id(id: &str) -> Result<(), ApiError> {
    if id.trim().is_empty() {
        return Err(ApiError::Validation("document id must not be empty".to_string()));
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Map a status to `Ok` when `accepted`, otherwise to its error class.
fn check_status(response: &HttpResponse, accepted: fn(u16) -> bool) -> Result<(), ApiError> {
    let status = response.status;
    if accepted(status) {
        return Ok(());
    }
    let body = response.body.clone();
    Err(match status {
        429 => ApiError::RateLimited {
            retry_after: retry_after(response),
        },
        500.. => ApiError::Server { status, body },
        401 | 403 => ApiError::Authentication { status, body },
        400..=499 => ApiError::Client { status, body },
        _ => ApiError::UnexpectedStatus { status, body },
    })
}
