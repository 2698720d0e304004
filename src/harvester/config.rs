//! Harvest configuration constants

use std::time::Duration;

/// Attempts made for one request before giving up on transient server failures.
pub const MAX_ATTEMPTS: u32 = 5;

/// Fixed delay between attempts after a transient server failure.
pub const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Minimum spacing between full-archive search requests (1 request/sec limit).
pub const SEARCH_SPACING: Duration = Duration::from_millis(1000);

/// Minimum spacing between batched id lookup requests.
pub const LOOKUP_SPACING: Duration = Duration::from_millis(1100);

/// Smallest batch the search endpoint accepts for `max_results`.
pub const MIN_BATCH_SIZE: usize = 10;

/// Largest number of ids or handles accepted by one lookup request.
pub const MAX_LOOKUP_BATCH: usize = 100;

/// Largest `max_results` accepted by full-archive search.
pub const MAX_SEARCH_PAGE: usize = 500;

/// Timeline page size bounds.
pub const MIN_TIMELINE_PAGE: u32 = 5;
/// Timeline page size bounds.
pub const MAX_TIMELINE_PAGE: u32 = 100;

/// Default per-request batch ceiling for search and lookups.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default timeline page size.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Number of 429 waits honoured for one request before failing it.
pub const MAX_RATE_LIMIT_WAITS: u32 = 3;

/// Upper bound on a single wait for the rate limit window to reset.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(15 * 60);

/// Wait used when a 429 response carries no usable reset header.
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Consecutive empty responses tolerated for the same continuation token.
pub const EMPTY_RETRY_LIMIT: u32 = 3;

/// Consecutive failed requests tolerated for the same continuation token.
pub const FAILED_PAGE_LIMIT: u32 = 3;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

/// Time to wait for a rate limit window that resets at `reset_epoch` (seconds).
///
/// Falls back to [`DEFAULT_RATE_LIMIT_WAIT`] without a reset time and never
/// exceeds [`MAX_RATE_LIMIT_WAIT`].
pub fn rate_limit_wait(reset_epoch: Option<i64>, now_epoch: i64) -> Duration {
    let wait = match reset_epoch {
        Some(reset) if reset > now_epoch => Duration::from_secs((reset - now_epoch) as u64 + 1),
        Some(_) => Duration::from_secs(1),
        None => DEFAULT_RATE_LIMIT_WAIT,
    };
    wait.min(MAX_RATE_LIMIT_WAIT)
}
