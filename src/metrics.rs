//! Prometheus metrics
//!
//! Request rates and latencies plus membership mutation counters.
//!
//! NOTE: user and segment ids are never used as labels; they would make the
//! series count grow with the data set.

use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Request Metrics
    // ============================================================================

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "segments_http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["method", "endpoint", "status"]
    ).unwrap();

    /// Total HTTP requests
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("segments_http_requests_total", "Total HTTP requests"),
        &["method", "endpoint", "status"]
    ).unwrap();

    // ============================================================================
    // Membership Metrics
    // ============================================================================

    /// Per-item reconciliation results
    pub static ref MEMBERSHIP_OPS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "segments_membership_ops_total",
            "Membership add/remove items by outcome"
        ),
        &["action", "outcome"]
    ).unwrap();

    /// Whole-batch reconcile duration
    pub static ref RECONCILE_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "segments_reconcile_duration_seconds",
            "Duration of one reconcile batch"
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5])
    ).unwrap();

    /// History entries that failed to persist after the membership change committed
    pub static ref HISTORY_WRITE_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "segments_history_write_failures_total",
        "History writes that failed after a committed membership change"
    ).unwrap();

    // ============================================================================
    // Catalog Metrics
    // ============================================================================

    /// Registered users (refreshed on scrape)
    pub static ref USERS_TOTAL: IntGauge = IntGauge::new(
        "segments_users", "Registered users"
    ).unwrap();

    /// Registered segments (refreshed on scrape)
    pub static ref SEGMENTS_TOTAL: IntGauge = IntGauge::new(
        "segments_segments", "Registered segments"
    ).unwrap();
}

/// Register all metrics with the global registry
pub fn register_metrics() -> Result<(), prometheus::Error> {
    METRICS_REGISTRY.register(Box::new(HTTP_REQUEST_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;

    METRICS_REGISTRY.register(Box::new(MEMBERSHIP_OPS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(RECONCILE_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(HISTORY_WRITE_FAILURES_TOTAL.clone()))?;

    METRICS_REGISTRY.register(Box::new(USERS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(SEGMENTS_TOTAL.clone()))?;

    Ok(())
}

/// Records elapsed time into a histogram when dropped
pub struct Timer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl Timer {
    pub fn new(histogram: Histogram) -> Self {
        Self {
            histogram,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
