//! Client configuration: endpoints, token source and rate-limit policy.
//!
//! Values come from `ReaderConfig::default()` and can be overridden from the
//! environment with `ReaderConfig::from_env()`:
//!
//! | variable              | field                  |
//! |-----------------------|------------------------|
//! | `READWISE_TOKEN`      | `token`                |
//! | `READWISE_BASE_URL`   | `base_url`             |
//! | `READWISE_AUTH_URL`   | `auth_url`             |
//! | `READWISE_AUTO_RETRY` | `retry.auto_retry`     |
//! | `READWISE_MAX_RETRIES`| `retry.max_retries`    |
//!
//! The token is also looked up lazily by `ReaderClient` at request time, so a
//! client built without one still picks up `READWISE_TOKEN` set later.

use std::env;
use std::time::Duration;

use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://readwise.io/api/v3";
pub const DEFAULT_AUTH_URL: &str = "https://readwise.io/api/v2/auth/";
pub const TOKEN_ENV: &str = "READWISE_TOKEN";

/// Applied when a 429 carries no usable `Retry-After` header. Reader allows
/// 20 requests per minute, so a full minute always clears the window.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Per-request deadline for HTTP transports.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest response body a transport should accept. A list page carries up
/// to 100 documents and, with `withHtmlContent`, each one's full html.
pub const MAX_RESPONSE_BYTES: u64 = 256 * 1024 * 1024;

/// What to do when the server answers 429.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Sleep for the server-supplied duration and re-issue the request.
    pub auto_retry: bool,
    /// Give up after this many retries of one request. `None` never gives up.
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    pub fn retrying() -> Self {
        Self {
            auto_retry: true,
            max_retries: None,
        }
    }

    pub fn never() -> Self {
        Self::default()
    }

    /// Whether another attempt is allowed after `retries` have already run.
    pub fn allows(&self, retries: u32) -> bool {
        self.auto_retry && self.max_retries.map_or(true, |max| retries < max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    pub base_url: String,
    pub auth_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl ReaderConfig {
    /// Defaults overridden by any `READWISE_*` variables that are set.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            base_url: env::var("READWISE_BASE_URL").unwrap_or(defaults.base_url),
            auth_url: env::var("READWISE_AUTH_URL").unwrap_or(defaults.auth_url),
            token: env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()),
            timeout: defaults.timeout,
            retry: RetryPolicy {
                auto_retry: env::var("READWISE_AUTO_RETRY")
                    .map(|v| parse_flag(&v))
                    .unwrap_or(defaults.retry.auto_retry),
                max_retries: env::var("READWISE_MAX_RETRIES")
                    .ok()
                    .and_then(|v| v.parse().ok()),
            },
        };
        debug!(
            "Reader config: base_url={}, auth_url={}, token_set={}, auto_retry={}",
            config.base_url,
            config.auth_url,
            config.token.is_some(),
            config.retry.auto_retry
        );
        config
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_does_not_retry() {
        let policy = RetryPolicy::default();
        assert!(!policy.allows(0));
    }

    #[test]
    fn unbounded_policy_always_allows() {
        let policy = RetryPolicy::retrying();
        assert!(policy.allows(0));
        assert!(policy.allows(10_000));
    }

    #[test]
    fn retry_count_saturates_instead_of_wrapping() {
        let retries = u32::MAX.saturating_add(1);
        assert_eq!(retries, u32::MAX);
        assert!(RetryPolicy::retrying().allows(retries));
        let capped = RetryPolicy {
            auto_retry: true,
            max_retries: Some(u32::MAX),
        };
        assert!(!capped.allows(retries));
    }

    #[test]
    fn max_retries_caps_attempts() {
        let policy = RetryPolicy {
            auto_retry: true,
            max_retries: Some(2),
        };
        assert!(policy.allows(0));
        assert!(policy.allows(1));
        assert!(!policy.allows(2));
    }

    #[test]
    fn flag_parsing_accepts_one_and_true() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(!parse_flag("yes"));
        assert!(!parse_flag("0"));
    }

    #[test]
    fn from_env_reads_overrides() {
        let vars = [
            "READWISE_BASE_URL",
            "READWISE_AUTH_URL",
            "READWISE_AUTO_RETRY",
            "READWISE_MAX_RETRIES",
        ];

        env::set_var("READWISE_BASE_URL", "http://localhost:3000/api/v3");
        env::set_var("READWISE_AUTH_URL", "http://localhost:3000/api/v2/auth/");
        env::set_var("READWISE_AUTO_RETRY", "true");
        env::set_var("READWISE_MAX_RETRIES", "3");
        let config = ReaderConfig::from_env();
        assert_eq!(config.base_url, "http://localhost:3000/api/v3");
        assert_eq!(config.auth_url, "http://localhost:3000/api/v2/auth/");
        assert_eq!(
            config.retry,
            RetryPolicy {
                auto_retry: true,
                max_retries: Some(3),
            }
        );

        env::set_var("READWISE_AUTO_RETRY", "no");
        env::set_var("READWISE_MAX_RETRIES", "lots");
        let config = ReaderConfig::from_env();
        assert!(!config.retry.auto_retry);
        assert_eq!(config.retry.max_retries, None);

        for var in vars {
            env::remove_var(var);
        }
        let config = ReaderConfig::from_env();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.auth_url, DEFAULT_AUTH_URL);
        assert_eq!(config.retry, RetryPolicy::never());
    }

    #[test]
    fn default_endpoints_point_at_readwise() {
        let config = ReaderConfig::default();
        assert_eq!(config.base_url, "https://readwise.io/api/v3");
        assert_eq!(config.auth_url, "https://readwise.io/api/v2/auth/");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
