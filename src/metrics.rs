//! Harvest observability metrics
//!
//! Request, retry, page and record counters emitted through the `metrics`
//! facade. Without an installed recorder every call is a no-op, so library
//! users and tests pay nothing; the CLI installs the Prometheus exporter when
//! given `--metrics-addr`.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Install the Prometheus exporter on `addr`.
///
/// Idempotent: later calls are ignored.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "harvest_requests_total",
        Unit::Count,
        "Requests sent to the upstream API"
    );
    describe_counter!(
        "harvest_retries_total",
        Unit::Count,
        "Retries after transient server failures"
    );
    describe_counter!(
        "harvest_rate_limit_waits_total",
        Unit::Count,
        "Waits for a rate limit window to reset"
    );
    describe_counter!(
        "harvest_pages_total",
        Unit::Count,
        "Fetched pages by outcome (page, empty, failed)"
    );
    describe_counter!(
        "harvest_records_total",
        Unit::Count,
        "Rows merged per output table"
    );
    describe_counter!(
        "harvest_targets_total",
        Unit::Count,
        "Harvest targets by result"
    );
    describe_histogram!(
        "harvest_request_duration_seconds",
        Unit::Seconds,
        "Upstream request duration"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if the exporter is installed
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// New correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Timing and outcome of one upstream request
pub struct RequestMetrics {
    endpoint: &'static str,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl RequestMetrics {
    /// Start recording a request
    pub fn start(endpoint: &'static str, attempt: u32) -> Self {
        let correlation_id = generate_correlation_id();
        debug!(
            correlation_id = %correlation_id,
            endpoint,
            attempt,
            "Starting request"
        );
        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record completion with a short status label (`ok`, `server_error`, ...)
    pub fn record(&self, status: &'static str) {
        let duration = self.start_time.elapsed();

        counter!(
            "harvest_requests_total",
            "endpoint" => self.endpoint,
            "status" => status,
        )
        .increment(1);

        histogram!(
            "harvest_request_duration_seconds",
            "endpoint" => self.endpoint,
        )
        .record(duration.as_secs_f64());

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = self.endpoint,
            attempt = self.attempt,
            status,
            duration_ms = duration.as_millis() as u64,
            "Request completed"
        );
    }

    /// Correlation ID of this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record a retry after a transient failure
pub fn record_retry(endpoint: &'static str, attempt: u32) {
    counter!("harvest_retries_total", "endpoint" => endpoint).increment(1);
    debug!(endpoint, attempt, "Retry recorded");
}

/// Record a wait for the rate limit window
pub fn record_rate_limit_wait(endpoint: &'static str, wait: Duration) {
    counter!("harvest_rate_limit_waits_total", "endpoint" => endpoint).increment(1);
    warn!(
        endpoint,
        wait_secs = wait.as_secs(),
        "Rate limited, waiting for window reset"
    );
}

/// Record one fetched page by outcome label
pub fn record_page(outcome: &'static str) {
    counter!("harvest_pages_total", "outcome" => outcome).increment(1);
}

/// Record rows merged into `table`
pub fn record_records(table: &'static str, count: usize) {
    if count > 0 {
        counter!("harvest_records_total", "table" => table).increment(count as u64);
    }
}

/// Per-target harvest metrics
pub struct TargetMetrics {
    mode: &'static str,
    target: String,
    start_time: Instant,
}

impl TargetMetrics {
    /// Start tracking one target
    pub fn start(mode: &'static str, target: impl Into<String>) -> Self {
        let target = target.into();
        info!(mode, target = %target, "Harvest target started");
        Self {
            mode,
            target,
            start_time: Instant::now(),
        }
    }

    /// Record successful completion
    pub fn record_success(&self, records: usize) {
        counter!(
            "harvest_targets_total",
            "mode" => self.mode,
            "result" => "completed",
        )
        .increment(1);
        info!(
            mode = self.mode,
            target = %self.target,
            records,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Harvest target completed"
        );
    }

    /// Record failure
    pub fn record_failure(&self, error: &str) {
        counter!(
            "harvest_targets_total",
            "mode" => self.mode,
            "result" => "failed",
        )
        .increment(1);
        error!(
            mode = self.mode,
            target = %self.target,
            error = %error,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Harvest target failed"
        );
    }
}
