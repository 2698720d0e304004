//! Rate-limited request executor
//!
//! Wraps a [`Transport`] with the request policy of one harvest run:
//!
//! - transient failures (5xx, network) are retried up to
//!   [`MAX_ATTEMPTS`] attempts with a fixed [`RETRY_DELAY`] between them,
//!   then surface as [`FetcherError::MaxRetriesExceeded`]
//! - 429 responses wait for the window reset (capped), at most
//!   [`MAX_RATE_LIMIT_WAITS`] times, without using up attempts
//! - every request, successful or not, is followed by the rest of the
//!   endpoint's minimum spacing
//!
//! An executor is created per run and owns no state shared with other runs.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::{FetchOutcome, FetcherError, Page, PageRequest, PageSource, Transport};
use crate::harvester::config::{rate_limit_wait, MAX_ATTEMPTS, MAX_RATE_LIMIT_WAITS, RETRY_DELAY};
use crate::harvester::spacing::RequestSpacer;
use crate::metrics::{self, RequestMetrics};

/// Executes page requests with retries and spacing
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    max_attempts: u32,
    retry_delay: Duration,
    max_rate_limit_waits: u32,
    requests_sent: u64,
}

impl RequestExecutor {
    /// Executor with the default retry policy
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            max_attempts: MAX_ATTEMPTS,
            retry_delay: RETRY_DELAY,
            max_rate_limit_waits: MAX_RATE_LIMIT_WAITS,
            requests_sent: 0,
        }
    }

    /// Requests sent so far, including retries
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    /// Execute one page request: retries, then spacing, then classification.
    pub async fn execute(&mut self, request: &PageRequest) -> FetchOutcome {
        let started = Instant::now();
        let outcome = self.request_with_retry(request).await;

        RequestSpacer::new(request.endpoint.min_spacing())
            .pace(started)
            .await;

        metrics::record_page(outcome.label());
        outcome
    }

    async fn request_with_retry(&mut self, request: &PageRequest) -> FetchOutcome {
        let endpoint = request.endpoint.label();
        let path = request.endpoint.path();
        let mut attempt = 0;
        let mut rate_limit_waits = 0;

        loop {
            attempt += 1;
            self.requests_sent += 1;
            let request_metrics = RequestMetrics::start(endpoint, attempt);

            let error = match self.transport.get_json(&path, &request.params).await {
                Ok(body) => {
                    request_metrics.record("ok");
                    if attempt > 1 {
                        debug!(endpoint, attempt, "Request succeeded after retry");
                    }
                    return Page::parse(body);
                }
                Err(e) => e,
            };

            match error {
                FetcherError::RateLimited { reset } if rate_limit_waits < self.max_rate_limit_waits => {
                    request_metrics.record("rate_limited");
                    rate_limit_waits += 1;
                    // 429s do not count against the transient-failure budget
                    attempt -= 1;
                    let wait = rate_limit_wait(reset, Utc::now().timestamp());
                    metrics::record_rate_limit_wait(endpoint, wait);
                    sleep(wait).await;
                }
                e if e.is_transient() => {
                    request_metrics.record("transient");
                    if attempt >= self.max_attempts {
                        warn!(
                            endpoint,
                            attempts = attempt,
                            error = %e,
                            "Giving up after repeated server failures"
                        );
                        return FetchOutcome::Failed(FetcherError::MaxRetriesExceeded {
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }
                    warn!(
                        endpoint,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Transient failure, retrying in {:?}",
                        self.retry_delay
                    );
                    metrics::record_retry(endpoint, attempt);
                    sleep(self.retry_delay).await;
                }
                e => {
                    request_metrics.record("error");
                    warn!(endpoint, error = %e, "Request failed");
                    return FetchOutcome::Failed(e);
                }
            }
        }
    }
}

#[async_trait]
impl PageSource for RequestExecutor {
    async fn fetch(&mut self, request: &PageRequest) -> FetchOutcome {
        self.execute(request).await
    }
}
