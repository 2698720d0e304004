//! Response body parsing
//!
//! The v2 API answers with `data` (a list, or a single object for by-id
//! endpoints), optional `includes` side tables, `meta.next_token` and, for
//! partial failures, an `errors` list. Entities stay raw JSON here; turning
//! them into rows is the normalizer's job.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{FetchOutcome, FetcherError};

/// Side tables pulled in by expansions
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Includes {
    /// Referenced (or pinned) tweets
    pub tweets: Vec<Value>,
    /// Related user profiles
    pub users: Vec<Value>,
    /// Attached media
    pub media: Vec<Value>,
}

impl Includes {
    /// Whether no side table has rows
    pub fn is_empty(&self) -> bool {
        self.tweets.is_empty() && self.users.is_empty() && self.media.is_empty()
    }
}

/// One API response with data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Primary entities
    pub data: Vec<Value>,
    /// Side tables
    pub includes: Includes,
    /// Continuation token
    pub next_token: Option<String>,
    /// Per-item API errors reported alongside the data
    pub errors: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DataField {
    Many(Vec<Value>),
    One(Value),
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Meta {
    next_token: Option<String>,
    result_count: Option<u64>,
}

#[derive(Deserialize)]
struct RawResponse {
    data: Option<DataField>,
    #[serde(default)]
    includes: Includes,
    #[serde(default)]
    meta: Meta,
    #[serde(default)]
    errors: Vec<Value>,
}

impl Page {
    /// Classify a response body.
    ///
    /// A body without data (or with an empty data list) is
    /// [`FetchOutcome::Empty`], even when the API also sent `errors`.
    pub fn parse(body: Value) -> FetchOutcome {
        let raw: RawResponse = match serde_json::from_value(body) {
            Ok(raw) => raw,
            Err(e) => {
                return FetchOutcome::Failed(FetcherError::ParseError(format!(
                    "unexpected response shape: {e}"
                )))
            }
        };

        let data = match raw.data {
            Some(DataField::Many(items)) => items,
            Some(DataField::One(Value::Null)) | None => Vec::new(),
            Some(DataField::One(item)) => vec![item],
        };

        if !raw.errors.is_empty() {
            warn!(
                count = raw.errors.len(),
                first = %raw.errors[0],
                "API reported errors alongside the response"
            );
        }

        if data.is_empty() {
            debug!(
                result_count = ?raw.meta.result_count,
                has_token = raw.meta.next_token.is_some(),
                "Response carried no data"
            );
            return FetchOutcome::Empty {
                next_token: raw.meta.next_token,
            };
        }

        FetchOutcome::Page(Page {
            data,
            includes: raw.includes,
            next_token: raw.meta.next_token,
            errors: raw.errors,
        })
    }

    /// Number of entities across the primary list and side tables
    pub fn entity_count(&self) -> usize {
        self.data.len()
            + self.includes.tweets.len()
            + self.includes.users.len()
            + self.includes.media.len()
    }
}
