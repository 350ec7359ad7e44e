//! Synchronous API client core for Readwise Reader.
//!
//! # Overview
//! Builds `HttpRequest` values and parses `HttpResponse` values without
//! touching the network (host-does-IO pattern). `Reader` drives those
//! requests through a caller-supplied `Transport`, adding cursor pagination
//! and rate-limit retry on top.
//!
//! # Design
//! - `ReaderClient` is stateless. It holds only endpoint URLs and an optional
//!   token.
//! - Each operation is split into `build_*` (validates, produces a request)
//!   and `parse_*` (status dispatch, decode), so the I/O boundary is explicit.
//! - `Reader<T: Transport>` owns the loops: pagination and 429 retry.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod reader;
pub mod types;

pub use client::ReaderClient;
pub use config::{ReaderConfig, RetryPolicy};
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport};
pub use reader::{DocumentStream, Reader};
pub use types::{
    Category, DeleteRequest, DeleteResult, DeleteTarget, Document, ListFilter, ListPage, Location,
    PublishedDate, SaveRequest, SaveResult, Tag, UpdateRequest, UpdateResult,
};
