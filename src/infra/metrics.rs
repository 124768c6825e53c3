//! Lock-free screening metrics and periodic reporting
//!
//! Check counters and the latency histogram are updated with atomics on the
//! query path; `report()` swaps the per-interval values to zero and returns a
//! snapshot for the log reporter. `snapshot()` reads without resetting and
//! backs the cumulative Prometheus histogram.
//!
//! NOTE: All atomics use Relaxed ordering. These are statistical counters
//! only and must not be used to coordinate store state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries for check latency (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Public aliases for the HTTP exporter
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Upper bound of the bucket containing the given percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Last bucket reports 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Total checks ever answered (monotonic)
    checks_total: AtomicU64,
    /// Checks since last report (reset on report)
    checks_since_report: AtomicU64,
    /// Total checks that reported a match (monotonic)
    matches_total: AtomicU64,
    /// Checks that failed on a store error (monotonic)
    store_errors_total: AtomicU64,
    /// Check latency histogram (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of check latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Check latency histogram since start (cumulative, never reset)
    cumulative_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of all check latencies since start (cumulative)
    cumulative_latency_sum_us: AtomicU64,
    /// Max check latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Completed refresh cycles (monotonic)
    refreshes_total: AtomicU64,
    /// Refresh cycles that changed the store (monotonic)
    refresh_changes_total: AtomicU64,
    /// Refresh cycles that failed in fetch or persist (monotonic)
    refresh_failures_total: AtomicU64,
    /// Lists replaced across all refreshes (monotonic)
    lists_replaced_total: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            checks_total: AtomicU64::new(0),
            checks_since_report: AtomicU64::new(0),
            matches_total: AtomicU64::new(0),
            store_errors_total: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_sum_us: AtomicU64::new(0),
            cumulative_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            cumulative_latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            refreshes_total: AtomicU64::new(0),
            refresh_changes_total: AtomicU64::new(0),
            refresh_failures_total: AtomicU64::new(0),
            lists_replaced_total: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record an answered check (lock-free)
    #[inline]
    pub fn record_check(&self, latency_us: u64, matched: bool) {
        self.checks_total.fetch_add(1, Ordering::Relaxed);
        self.checks_since_report.fetch_add(1, Ordering::Relaxed);
        if matched {
            self.matches_total.fetch_add(1, Ordering::Relaxed);
        }
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.cumulative_latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.cumulative_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_store_error(&self) {
        self.store_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished refresh cycle and how many lists it replaced
    pub fn record_refresh(&self, lists_replaced: usize) {
        self.refreshes_total.fetch_add(1, Ordering::Relaxed);
        if lists_replaced > 0 {
            self.refresh_changes_total.fetch_add(1, Ordering::Relaxed);
            self.lists_replaced_total.fetch_add(lists_replaced as u64, Ordering::Relaxed);
        }
    }

    pub fn record_refresh_failure(&self) {
        self.refresh_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn checks_total(&self) -> u64 {
        self.checks_total.load(Ordering::Relaxed)
    }

    pub fn matches_total(&self) -> u64 {
        self.matches_total.load(Ordering::Relaxed)
    }

    pub fn refreshes_total(&self) -> u64 {
        self.refreshes_total.load(Ordering::Relaxed)
    }

    pub fn refresh_failures_total(&self) -> u64 {
        self.refresh_failures_total.load(Ordering::Relaxed)
    }

    /// Snapshot and reset the per-interval counters
    pub fn report(&self, lists_loaded: usize, store_loads: u64) -> MetricsSummary {
        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed().as_secs_f64();
            *last = Instant::now();
            elapsed
        };

        let checks = self.checks_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.latency_max_us.swap(0, Ordering::Relaxed);
        let buckets = swap_buckets(&self.latency_buckets);

        let avg_latency_us = if checks > 0 { latency_sum / checks } else { 0 };
        let checks_per_sec = if elapsed_secs > 0.0 { checks as f64 / elapsed_secs } else { 0.0 };

        MetricsSummary {
            checks_since_report: checks,
            checks_per_sec,
            avg_latency_us,
            max_latency_us: latency_max,
            p50_latency_us: percentile_from_buckets(&buckets, 0.50),
            p99_latency_us: percentile_from_buckets(&buckets, 0.99),
            latency_buckets: buckets,
            ..self.snapshot(lists_loaded, store_loads)
        }
    }

    /// Read-only view for scrapes. Interval fields are left at zero and
    /// nothing is reset, so the log reporter keeps its window.
    pub fn snapshot(&self, lists_loaded: usize, store_loads: u64) -> MetricsSummary {
        MetricsSummary {
            checks_total: self.checks_total.load(Ordering::Relaxed),
            checks_since_report: 0,
            checks_per_sec: 0.0,
            matches_total: self.matches_total.load(Ordering::Relaxed),
            store_errors_total: self.store_errors_total.load(Ordering::Relaxed),
            avg_latency_us: 0,
            max_latency_us: 0,
            p50_latency_us: 0,
            p99_latency_us: 0,
            latency_buckets: [0; NUM_BUCKETS],
            cumulative_latency_buckets: load_buckets(&self.cumulative_latency_buckets),
            cumulative_latency_sum_us: self.cumulative_latency_sum_us.load(Ordering::Relaxed),
            refreshes_total: self.refreshes_total.load(Ordering::Relaxed),
            refresh_changes_total: self.refresh_changes_total.load(Ordering::Relaxed),
            refresh_failures_total: self.refresh_failures_total.load(Ordering::Relaxed),
            lists_replaced_total: self.lists_replaced_total.load(Ordering::Relaxed),
            lists_loaded,
            store_loads,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub checks_total: u64,
    pub checks_since_report: u64,
    pub checks_per_sec: f64,
    pub matches_total: u64,
    pub store_errors_total: u64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    pub p50_latency_us: u64,
    pub p99_latency_us: u64,
    /// Per-interval histogram (filled by `report` only)
    pub latency_buckets: [u64; NUM_BUCKETS],
    pub cumulative_latency_buckets: [u64; NUM_BUCKETS],
    pub cumulative_latency_sum_us: u64,
    pub refreshes_total: u64,
    pub refresh_changes_total: u64,
    pub refresh_failures_total: u64,
    pub lists_replaced_total: u64,
    pub lists_loaded: usize,
    pub store_loads: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            checks_total = %self.checks_total,
            checks_per_sec = %format!("{:.1}", self.checks_per_sec),
            matches_total = %self.matches_total,
            store_errors = %self.store_errors_total,
            avg_latency_us = %self.avg_latency_us,
            p99_latency_us = %self.p99_latency_us,
            max_latency_us = %self.max_latency_us,
            refreshes = %self.refreshes_total,
            refresh_failures = %self.refresh_failures_total,
            lists_loaded = %self.lists_loaded,
            store_loads = %self.store_loads,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(51201), 10);
    }

    #[test]
    fn test_record_check_and_report_resets_interval() {
        let metrics = Metrics::new();
        metrics.record_check(150, true);
        metrics.record_check(250, false);
        metrics.record_check(90, false);

        let summary = metrics.report(3, 1);
        assert_eq!(summary.checks_total, 3);
        assert_eq!(summary.checks_since_report, 3);
        assert_eq!(summary.matches_total, 1);
        assert_eq!(summary.avg_latency_us, 163);
        assert_eq!(summary.max_latency_us, 250);
        assert_eq!(summary.latency_buckets[0], 1);
        assert_eq!(summary.lists_loaded, 3);

        let next = metrics.report(3, 1);
        assert_eq!(next.checks_total, 3);
        assert_eq!(next.checks_since_report, 0);
        assert_eq!(next.max_latency_us, 0);
    }

    #[test]
    fn test_refresh_counters() {
        let metrics = Metrics::new();
        metrics.record_refresh(0);
        metrics.record_refresh(2);
        metrics.record_refresh_failure();

        let summary = metrics.report(0, 0);
        assert_eq!(summary.refreshes_total, 2);
        assert_eq!(summary.refresh_changes_total, 1);
        assert_eq!(summary.lists_replaced_total, 2);
        assert_eq!(summary.refresh_failures_total, 1);
    }

    #[test]
    fn test_snapshot_is_cumulative_across_reports() {
        let metrics = Metrics::new();
        metrics.record_check(150, true);
        metrics.record_check(60_000, false);

        // Reporter tick drains the interval window only
        let interval = metrics.report(0, 0);
        assert_eq!(interval.checks_since_report, 2);

        let scraped = metrics.snapshot(0, 0);
        assert_eq!(scraped.cumulative_latency_buckets.iter().sum::<u64>(), 2);
        assert_eq!(scraped.cumulative_latency_sum_us, 60_150);
        assert_eq!(scraped.checks_total, 2);

        // Scraping does not reset the reporter's window
        metrics.record_check(90, false);
        metrics.snapshot(0, 0);
        assert_eq!(metrics.report(0, 0).checks_since_report, 1);
        assert_eq!(metrics.snapshot(0, 0).cumulative_latency_buckets[0], 1);
    }

    #[test]
    fn test_percentile_empty() {
        assert_eq!(percentile_from_buckets(&[0; NUM_BUCKETS], 0.99), 0);
    }
}
