//! Upstream API access
//!
//! Layers, leaves first:
//!
//! - [`Transport`]: one authenticated GET returning the JSON body, with HTTP
//!   failures classified into [`FetcherError`] variants
//! - [`parser`]: turns a response body into a [`FetchOutcome`]
//! - [`executor::RequestExecutor`]: retry ceiling, 429 waits and per-endpoint
//!   request spacing around a transport
//! - [`pagination::PaginationDriver`]: token- and plan-driven page loops

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::harvester::config::{LOOKUP_SPACING, SEARCH_SPACING};

pub mod executor;
pub mod http;
pub mod pagination;
pub mod parser;

pub use executor::RequestExecutor;
pub use pagination::{PaginationDriver, PaginationSummary};
pub use parser::{Includes, Page};

/// Fetcher errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetcherError {
    /// 5xx response
    #[error("server error {status}: {body}")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// Connection, timeout or other transport failure
    #[error("network error: {0}")]
    NetworkError(String),

    /// 429 response
    #[error("rate limit exceeded (reset at {reset:?})")]
    RateLimited {
        /// Epoch seconds from `x-rate-limit-reset`, if present
        reset: Option<i64>,
    },

    /// Non-retryable 4xx response
    #[error("API error {status}: {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error detail
        message: String,
    },

    /// Response body was not the JSON document expected
    #[error("parse error: {0}")]
    ParseError(String),

    /// Transient failures outlasted the retry ceiling
    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        /// Attempts made
        attempts: u32,
        /// Last transient error seen
        last_error: String,
    },

    /// Transport could not be constructed
    #[error("client setup failed: {0}")]
    ClientSetup(String),
}

impl FetcherError {
    /// Whether the failure is worth retrying after a short delay
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetcherError::ServerError { .. } | FetcherError::NetworkError(_)
        )
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// One authenticated GET against the upstream API.
///
/// Implementations classify failures (5xx, 429, other 4xx, network) into
/// [`FetcherError`] and never retry on their own.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `path` with query `params`, returning the decoded JSON body
    async fn get_json(&self, path: &str, params: &[(String, String)]) -> FetcherResult<Value>;
}

/// Upstream endpoints used by the harvester
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Posts authored by one user, token paginated
    UserTweets {
        /// Numeric user id
        user_id: String,
    },
    /// Full-archive keyword search, token paginated
    SearchAll,
    /// Tweets by id list (`ids` parameter)
    TweetsById,
    /// Users by id list (`ids` parameter)
    UsersById,
    /// Users by handle list (`usernames` parameter)
    UsersByUsername,
}

impl Endpoint {
    /// Request path
    pub fn path(&self) -> String {
        match self {
            Endpoint::UserTweets { user_id } => format!("/2/users/{user_id}/tweets"),
            Endpoint::SearchAll => "/2/tweets/search/all".to_string(),
            Endpoint::TweetsById => "/2/tweets".to_string(),
            Endpoint::UsersById => "/2/users".to_string(),
            Endpoint::UsersByUsername => "/2/users/by".to_string(),
        }
    }

    /// Minimum wall-clock spacing between consecutive requests
    pub fn min_spacing(&self) -> Option<Duration> {
        match self {
            Endpoint::UserTweets { .. } => None,
            Endpoint::SearchAll => Some(SEARCH_SPACING),
            Endpoint::TweetsById | Endpoint::UsersById | Endpoint::UsersByUsername => {
                Some(LOOKUP_SPACING)
            }
        }
    }

    /// Parameter carrying the continuation token, for paginated endpoints
    pub fn token_param(&self) -> Option<&'static str> {
        match self {
            Endpoint::UserTweets { .. } => Some("pagination_token"),
            Endpoint::SearchAll => Some("next_token"),
            _ => None,
        }
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Endpoint::UserTweets { .. } => "user_tweets",
            Endpoint::SearchAll => "search_all",
            Endpoint::TweetsById => "tweets_by_id",
            Endpoint::UsersById => "users_by_id",
            Endpoint::UsersByUsername => "users_by_username",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Endpoint plus query parameters for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Target endpoint
    pub endpoint: Endpoint,
    /// Query parameters, in insertion order
    pub params: Vec<(String, String)>,
}

impl PageRequest {
    /// Request with no parameters
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            params: Vec::new(),
        }
    }

    /// Set `key` to `value`, replacing an earlier value
    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        let key = key.into();
        let value = value.to_string();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.params.push((key, value)),
        }
        self
    }

    /// Append every pair in `params`
    pub fn with_params(self, params: impl IntoIterator<Item = (String, String)>) -> Self {
        params
            .into_iter()
            .fold(self, |req, (key, value)| req.with_param(key, value))
    }

    /// Copy of this request positioned at `token` (no-op without a token parameter)
    pub fn at_token(&self, token: Option<&str>) -> Self {
        match (self.endpoint.token_param(), token) {
            (Some(param), Some(token)) => self.clone().with_param(param, token),
            _ => self.clone(),
        }
    }

    /// Value of parameter `key`
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Result of fetching one page
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Response with a primary data list
    Page(Page),
    /// Successful response without data
    Empty {
        /// Continuation token, if the API still returned one
        next_token: Option<String>,
    },
    /// Request failed after retries, or with a non-retryable error
    Failed(FetcherError),
}

impl FetchOutcome {
    /// Outcome label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Page(_) => "page",
            FetchOutcome::Empty { .. } => "empty",
            FetchOutcome::Failed(_) => "failed",
        }
    }
}

/// Source of pages for the pagination driver
#[async_trait]
pub trait PageSource: Send {
    /// Fetch one page
    async fn fetch(&mut self, request: &PageRequest) -> FetchOutcome;
}
