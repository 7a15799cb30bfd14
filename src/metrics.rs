//! Runtime metrics for the status endpoint
//!
//! Thread-safe counters and a latency histogram shared across the HTTP
//! layer and the background workers. All fields are atomics or
//! RwLock-wrapped; recording is cheap enough to sit on every request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Request latency percentile metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyMetrics {
    /// 50th percentile (median) latency in milliseconds
    pub p50_ms: f64,
    /// 95th percentile latency in milliseconds
    pub p95_ms: f64,
    /// 99th percentile latency in milliseconds
    pub p99_ms: f64,
    /// Total number of requests recorded
    pub total_requests: u64,
    /// Mean latency in milliseconds
    pub mean_ms: f64,
    /// Maximum latency recorded in milliseconds
    pub max_ms: f64,
}

/// Thread-safe latency histogram for recording request timings.
///
/// Tracks latencies from 1us to 60 seconds with 3 significant figures.
#[derive(Debug)]
pub struct LatencyHistogram {
    inner: RwLock<Histogram<u64>>,
}

impl LatencyHistogram {
    /// Create an empty histogram
    pub fn new() -> Self {
        let histogram =
            Histogram::new_with_bounds(1, 60_000_000, 3).expect("histogram bounds are static");
        Self {
            inner: RwLock::new(histogram),
        }
    }

    /// Record a latency value in microseconds; out-of-bounds values are
    /// silently ignored
    pub fn record(&self, latency_us: u64) {
        let mut hist = self.inner.write();
        let _ = hist.record(latency_us);
    }

    /// Record a latency duration
    pub fn record_duration(&self, duration: std::time::Duration) {
        self.record(duration.as_micros() as u64);
    }

    /// Complete latency metrics, percentiles in milliseconds
    pub fn metrics(&self) -> LatencyMetrics {
        let hist = self.inner.read();
        LatencyMetrics {
            p50_ms: hist.value_at_percentile(50.0) as f64 / 1000.0,
            p95_ms: hist.value_at_percentile(95.0) as f64 / 1000.0,
            p99_ms: hist.value_at_percentile(99.0) as f64 / 1000.0,
            total_requests: hist.len(),
            mean_ms: hist.mean() / 1000.0,
            max_ms: hist.max() as f64 / 1000.0,
        }
    }

    /// Clear all recorded values
    pub fn reset(&self) {
        self.inner.write().reset();
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared runtime counters for the whole service
#[derive(Debug)]
pub struct ServiceMetrics {
    start_time: Instant,
    /// Webhook deliveries that passed verification
    webhooks_accepted: AtomicU64,
    /// Webhook deliveries rejected by the verifier
    webhooks_rejected: AtomicU64,
    /// Duplicate deliveries suppressed by the receipt log
    webhooks_duplicate: AtomicU64,
    /// Completed background sync runs
    syncs_completed: AtomicU64,
    /// Background sync runs that exhausted their attempts
    syncs_failed: AtomicU64,
    /// Successful OAuth installs (including re-auth)
    installs: AtomicU64,
    /// HTTP requests served
    requests_total: AtomicU64,
    latency: LatencyHistogram,
}

impl ServiceMetrics {
    /// Create zeroed metrics anchored to the current instant
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            webhooks_accepted: AtomicU64::new(0),
            webhooks_rejected: AtomicU64::new(0),
            webhooks_duplicate: AtomicU64::new(0),
            syncs_completed: AtomicU64::new(0),
            syncs_failed: AtomicU64::new(0),
            installs: AtomicU64::new(0),
            requests_total: AtomicU64::new(0),
            latency: LatencyHistogram::new(),
        }
    }

    /// Server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Record an accepted webhook delivery
    pub fn record_webhook_accepted(&self) {
        self.webhooks_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected webhook delivery
    pub fn record_webhook_rejected(&self) {
        self.webhooks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a suppressed duplicate delivery
    pub fn record_webhook_duplicate(&self) {
        self.webhooks_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed sync run
    pub fn record_sync_completed(&self) {
        self.syncs_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed sync run
    pub fn record_sync_failed(&self) {
        self.syncs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful install
    pub fn record_install(&self) {
        self.installs.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a served request and its latency
    pub fn record_request(&self, duration: std::time::Duration) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.latency.record_duration(duration);
    }

    /// Accepted webhook count
    pub fn webhooks_accepted(&self) -> u64 {
        self.webhooks_accepted.load(Ordering::Relaxed)
    }

    /// Rejected webhook count
    pub fn webhooks_rejected(&self) -> u64 {
        self.webhooks_rejected.load(Ordering::Relaxed)
    }

    /// Duplicate webhook count
    pub fn webhooks_duplicate(&self) -> u64 {
        self.webhooks_duplicate.load(Ordering::Relaxed)
    }

    /// Completed sync count
    pub fn syncs_completed(&self) -> u64 {
        self.syncs_completed.load(Ordering::Relaxed)
    }

    /// Failed sync count
    pub fn syncs_failed(&self) -> u64 {
        self.syncs_failed.load(Ordering::Relaxed)
    }

    /// Install count
    pub fn installs(&self) -> u64 {
        self.installs.load(Ordering::Relaxed)
    }

    /// Served request count
    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Latency percentiles
    pub fn latency_metrics(&self) -> LatencyMetrics {
        self.latency.metrics()
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}
