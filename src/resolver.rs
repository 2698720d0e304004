//! Identifier resolution
//!
//! Timeline and user queries accept either a human-readable handle or the
//! API's stable numeric id. Handles are resolved with one call to the
//! users-by-username endpoint before pagination starts; numeric ids pass
//! through without touching the network.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::fetcher::{FetcherError, Transport};

/// Longest handle the platform allows
const MAX_HANDLE_LEN: usize = 15;

/// How a target identifier is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    /// `@handle` / username
    Handle,
    /// Numeric author id
    #[serde(rename = "author_id")]
    NumericId,
}

impl IdentifierKind {
    /// Column name used when tagging rows with the target identifier
    pub fn column_name(&self) -> &'static str {
        match self {
            IdentifierKind::Handle => "handle",
            IdentifierKind::NumericId => "author_id",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

impl FromStr for IdentifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "handle" | "username" => Ok(IdentifierKind::Handle),
            "author_id" | "id" => Ok(IdentifierKind::NumericId),
            _ => Err(format!(
                "Invalid identifier kind: {s}. Valid options: handle, author_id"
            )),
        }
    }
}

/// Errors raised while resolving an identifier
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Identifier is not a valid handle or numeric id
    #[error("invalid {kind} identifier '{identifier}'")]
    InvalidIdentifier {
        /// Offending identifier
        identifier: String,
        /// Expected kind
        kind: IdentifierKind,
    },

    /// The API answered but returned no user
    #[error("handle '{handle}' not found: {detail}")]
    NotFound {
        /// Handle that was looked up
        handle: String,
        /// API error detail, if any
        detail: String,
    },

    /// Request failed
    #[error("lookup request failed: {0}")]
    Fetch(#[from] FetcherError),
}

/// Result type for identifier resolution
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Normalize a handle: trims whitespace and a leading `@`.
///
/// # Examples
///
/// ```
/// use tweet_harvester::resolver::normalize_handle;
///
/// assert_eq!(normalize_handle(" @jack ").unwrap(), "jack");
/// assert!(normalize_handle("not a handle").is_none());
/// ```
pub fn normalize_handle(raw: &str) -> Option<String> {
    let handle = raw.trim().trim_start_matches('@');
    let valid = !handle.is_empty()
        && handle.len() <= MAX_HANDLE_LEN
        && handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then(|| handle.to_string())
}

fn is_numeric_id(raw: &str) -> bool {
    !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit())
}

/// Resolves handles to canonical numeric ids
pub struct IdentifierResolver<'a> {
    transport: &'a dyn Transport,
}

impl<'a> IdentifierResolver<'a> {
    /// Create a resolver over `transport`
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Resolve `identifier` to the API's numeric id.
    ///
    /// Numeric ids are validated and returned as-is. Handles cost exactly one
    /// request; failures are returned to the caller without retrying.
    pub async fn resolve(&self, identifier: &str, kind: IdentifierKind) -> ResolveResult<String> {
        let invalid = || ResolveError::InvalidIdentifier {
            identifier: identifier.to_string(),
            kind,
        };

        match kind {
            IdentifierKind::NumericId => {
                let id = identifier.trim();
                if !is_numeric_id(id) {
                    return Err(invalid());
                }
                debug!(id, "Numeric identifier passed through");
                Ok(id.to_string())
            }
            IdentifierKind::Handle => {
                let handle = normalize_handle(identifier).ok_or_else(invalid)?;
                let path = format!("/2/users/by/username/{handle}");
                let body = self.transport.get_json(&path, &[]).await?;

                let id = body
                    .get("data")
                    .and_then(|data| data.get("id"))
                    .and_then(|id| id.as_str())
                    .filter(|id| is_numeric_id(id));

                match id {
                    Some(id) => {
                        info!(handle = %handle, user_id = id, "Resolved handle");
                        Ok(id.to_string())
                    }
                    None => {
                        let detail = body
                            .get("errors")
                            .and_then(|errors| errors.get(0))
                            .and_then(|e| e.get("detail"))
                            .and_then(|d| d.as_str())
                            .unwrap_or("no user in response")
                            .to_string();
                        Err(ResolveError::NotFound { handle, detail })
                    }
                }
            }
        }
    }
}
