//! Minimum request spacing
//!
//! Full-archive search allows one request per second and the lookup
//! endpoints a little less. Rather than holding tokens, the spacer measures
//! how long the last request took and sleeps off the rest of the interval
//! before control returns to the caller.

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::trace;

/// Enforces a minimum wall-clock interval per request
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSpacer {
    min_interval: Option<Duration>,
}

impl RequestSpacer {
    /// Spacer with the given minimum interval (`None` disables spacing)
    pub fn new(min_interval: Option<Duration>) -> Self {
        Self { min_interval }
    }

    /// Spacer that never sleeps
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Configured minimum interval
    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval
    }

    /// Remaining time to wait for a request that began at `started`
    pub fn remaining(&self, started: Instant) -> Duration {
        self.min_interval
            .map(|interval| interval.saturating_sub(started.elapsed()))
            .unwrap_or(Duration::ZERO)
    }

    /// Sleep until `min_interval` has passed since `started`.
    ///
    /// Returns the time slept.
    pub async fn pace(&self, started: Instant) -> Duration {
        let wait = self.remaining(started);
        if !wait.is_zero() {
            trace!(wait_ms = wait.as_millis() as u64, "Spacing request");
            sleep(wait).await;
        }
        wait
    }
}
