//! Error types for the Reader API client.
//!
//! # Design
//! Every operation returns `Result<T, ApiError>`. Variants split along the
//! point where a call failed: before the network (`Validation`, `Config`,
//! `Serialization`), on the wire (`Transport`), in status dispatch
//! (`Authentication`, `RateLimited`, `Client`, `Server`, `UnexpectedStatus`)
//! or in decoding (`Decode`). Status-carrying variants keep the raw body for
//! diagnostics.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by `ReaderClient` and `Reader`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Caller input was rejected before any request was built.
    #[error("invalid parameter: {0}")]
    Validation(String),

    /// No token was passed explicitly and `READWISE_TOKEN` is unset.
    #[error("configuration error: {0}")]
    Config(String),

    /// The server returned 401 or 403.
    #[error("authentication failed (HTTP {status}): {body}")]
    Authentication { status: u16, body: String },

    /// The server returned 429 and asked the caller to wait.
    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// The server returned a 4xx other than 401, 403 or 429.
    #[error("request rejected (HTTP {status}): {body}")]
    Client { status: u16, body: String },

    /// The server returned a 5xx.
    #[error("server error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    /// A status outside every recognised class for the operation.
    #[error("unexpected HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// A lookup that had to succeed before the real request found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Decode(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The request never produced a response (connection, TLS, timeout).
    #[error("transport failed: {0}")]
    Transport(String),
}

impl ApiError {
    /// The HTTP status carried by the error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Authentication { status, .. }
            | ApiError::Client { status, .. }
            | ApiError::Server { status, .. }
            | ApiError::UnexpectedStatus { status, .. } => Some(*status),
            ApiError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}
