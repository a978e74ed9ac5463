//! Lock-free session metrics and periodic reporting
//!
//! Poll tasks, the write task and the controller record into the same
//! `Metrics` through an `Arc`. Counter updates are lock-free; `report()`
//! swaps the periodic counters to take a snapshot.
//!
//! NOTE: All atomics use Relaxed ordering. These are statistical counters
//! only and must not be used for coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Poll latency bucket boundaries (milliseconds)
/// Buckets: ≤5, ≤10, ≤25, ≤50, ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, >5000
const BUCKET_BOUNDS: [u64; 10] = [5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000];
const NUM_BUCKETS: usize = 11;

#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(current_max, new_value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Upper bound of the bucket holding the given percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Last bucket uses 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] = [5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 10000];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

pub struct Metrics {
    /// Successful polls (monotonic)
    polls_ok: AtomicU64,
    /// Failed polls (monotonic)
    polls_failed: AtomicU64,
    /// Polls since last report (reset on report)
    polls_since_report: AtomicU64,
    /// Snapshots dropped for an old epoch or generation (monotonic)
    stale_dropped: AtomicU64,
    /// Number entity writes accepted (monotonic)
    writes_ok: AtomicU64,
    /// Number entity writes rejected (monotonic)
    writes_failed: AtomicU64,
    /// Latency of the most recent successful poll (ms)
    last_poll_ms: AtomicU64,
    /// Sum of poll latencies (reset on report)
    poll_latency_sum_ms: AtomicU64,
    /// Max poll latency (reset on report)
    poll_latency_max_ms: AtomicU64,
    /// Poll latency histogram (reset on report)
    poll_latency_buckets: [AtomicU64; NUM_BUCKETS],
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            polls_ok: AtomicU64::new(0),
            polls_failed: AtomicU64::new(0),
            polls_since_report: AtomicU64::new(0),
            stale_dropped: AtomicU64::new(0),
            writes_ok: AtomicU64::new(0),
            writes_failed: AtomicU64::new(0),
            last_poll_ms: AtomicU64::new(0),
            poll_latency_sum_ms: AtomicU64::new(0),
            poll_latency_max_ms: AtomicU64::new(0),
            poll_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a completed `/api/states` fetch (lock-free)
    #[inline]
    pub fn record_poll(&self, latency_ms: u64) {
        self.polls_ok.fetch_add(1, Ordering::Relaxed);
        self.polls_since_report.fetch_add(1, Ordering::Relaxed);
        self.last_poll_ms.store(latency_ms, Ordering::Relaxed);
        self.poll_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.poll_latency_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.poll_latency_max_ms, latency_ms);
    }

    #[inline]
    pub fn record_poll_failed(&self) {
        self.polls_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stale_dropped(&self) {
        self.stale_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_writes(&self, ok: u64, failed: u64) {
        self.writes_ok.fetch_add(ok, Ordering::Relaxed);
        self.writes_failed.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn polls_ok(&self) -> u64 {
        self.polls_ok.load(Ordering::Relaxed)
    }

    pub fn polls_failed(&self) -> u64 {
        self.polls_failed.load(Ordering::Relaxed)
    }

    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped.load(Ordering::Relaxed)
    }

    pub fn last_poll_ms(&self) -> u64 {
        self.last_poll_ms.load(Ordering::Relaxed)
    }

    /// One line for the console header, read without resetting anything
    pub fn headline(&self) -> String {
        format!(
            "polls {} ok / {} failed | last {} ms | stale {} | writes {} ok / {} failed",
            self.polls_ok(),
            self.polls_failed(),
            self.last_poll_ms(),
            self.stale_dropped(),
            self.writes_ok.load(Ordering::Relaxed),
            self.writes_failed.load(Ordering::Relaxed),
        )
    }

    /// Snapshot all counters and reset the periodic ones
    pub fn report(&self) -> MetricsSummary {
        let polls_count = self.polls_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.poll_latency_sum_ms.swap(0, Ordering::Relaxed);
        let max_latency = self.poll_latency_max_ms.swap(0, Ordering::Relaxed);
        let buckets = swap_buckets(&self.poll_latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let polls_per_sec =
            if elapsed.as_secs_f64() > 0.0 { polls_count as f64 / elapsed.as_secs_f64() } else { 0.0 };
        let avg_poll_ms = if polls_count > 0 { latency_sum / polls_count } else { 0 };

        MetricsSummary {
            polls_ok: self.polls_ok(),
            polls_failed: self.polls_failed(),
            polls_per_sec,
            stale_dropped: self.stale_dropped(),
            writes_ok: self.writes_ok.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
            last_poll_ms: self.last_poll_ms(),
            avg_poll_ms,
            max_poll_ms: max_latency,
            poll_buckets: buckets,
            poll_p50_ms: percentile_from_buckets(&buckets, 0.50),
            poll_p99_ms: percentile_from_buckets(&buckets, 0.99),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub polls_ok: u64,
    pub polls_failed: u64,
    pub polls_per_sec: f64,
    pub stale_dropped: u64,
    pub writes_ok: u64,
    pub writes_failed: u64,
    pub last_poll_ms: u64,
    pub avg_poll_ms: u64,
    pub max_poll_ms: u64,
    /// Bounds: ≤5, ≤10, ≤25, ≤50, ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, >5000 ms
    pub poll_buckets: [u64; NUM_BUCKETS],
    pub poll_p50_ms: u64,
    pub poll_p99_ms: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            polls_ok = %self.polls_ok,
            polls_failed = %self.polls_failed,
            polls_per_sec = format!("{:.1}", self.polls_per_sec),
            avg_poll_ms = %self.avg_poll_ms,
            max_poll_ms = %self.max_poll_ms,
            p50_ms = %self.poll_p50_ms,
            p99_ms = %self.poll_p99_ms,
            stale_dropped = %self.stale_dropped,
            writes_ok = %self.writes_ok,
            writes_failed = %self.writes_failed,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.polls_ok(), 0);
        assert_eq!(metrics.stale_dropped(), 0);
    }

    #[test]
    fn test_report() {
        let metrics = Metrics::new();

        metrics.record_poll(20);
        metrics.record_poll(40);
        metrics.record_poll(60);
        metrics.record_poll_failed();
        metrics.record_writes(3, 1);

        let summary = metrics.report();

        assert_eq!(summary.polls_ok, 3);
        assert_eq!(summary.polls_failed, 1);
        assert_eq!(summary.avg_poll_ms, 40);
        assert_eq!(summary.max_poll_ms, 60);
        assert_eq!(summary.last_poll_ms, 60);
        assert_eq!(summary.writes_ok, 3);
        assert_eq!(summary.writes_failed, 1);

        // Periodic counters are reset, monotonic ones are not
        assert_eq!(metrics.poll_latency_sum_ms.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.poll_latency_max_ms.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.polls_ok(), 3);
    }

    #[test]
    fn test_report_empty() {
        let metrics = Metrics::new();
        let summary = metrics.report();

        assert_eq!(summary.avg_poll_ms, 0);
        assert_eq!(summary.poll_p99_ms, 0);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(5), 0);
        assert_eq!(bucket_index(6), 1);
        assert_eq!(bucket_index(500), 6);
        assert_eq!(bucket_index(5000), 9);
        assert_eq!(bucket_index(5001), 10);
    }

    #[test]
    fn test_percentile_computation() {
        let metrics = Metrics::new();
        for _ in 0..100 {
            metrics.record_poll(30);
        }

        let summary = metrics.report();
        assert_eq!(summary.poll_p50_ms, 50);
        assert_eq!(summary.poll_p99_ms, 50);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(Metrics::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let m = metrics.clone();
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    m.record_poll(i);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(metrics.polls_ok(), 1000);
        assert_eq!(metrics.report().max_poll_ms, 99);
    }

    #[test]
    fn test_headline() {
        let metrics = Metrics::new();
        metrics.record_poll(12);
        metrics.record_stale_dropped();
        assert_eq!(metrics.headline(), "polls 1 ok / 0 failed | last 12 ms | stale 1 | writes 0 ok / 0 failed");
    }
}
