//! Process-wide counters for the recorder and the batch jobs.
//!
//! Values live in atomics and are logged as a snapshot by the scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Gauge holding the last observed value.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Latency histogram in milliseconds.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s, 60s
    buckets: [AtomicU64; 12],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 12] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000, 60000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let slot = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[slot].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Bucket upper bounds with their counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the tracking engine.
#[derive(Debug, Default)]
pub struct Metrics {
    // Recorder
    pub events_recorded: Counter,
    pub pageviews_recorded: Counter,
    pub points_recorded: Counter,
    pub sessions_started: Counter,
    pub spam_rejected: Counter,
    pub client_errors: Counter,
    pub store_errors: Counter,

    // Daily compiler
    pub days_compiled: Counter,
    pub days_skipped: Counter,
    pub days_failed: Counter,
    pub events_skipped: Counter,

    // Monthly reducer and retention
    pub months_reduced: Counter,
    pub months_skipped: Counter,
    pub months_failed: Counter,
    pub days_deleted: Counter,

    // Latency
    pub record_latency_ms: Histogram,
    pub compile_latency_ms: Histogram,

    pub blacklist_hosts: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub events_recorded: u64,
    pub pageviews_recorded: u64,
    pub points_recorded: u64,
    pub sessions_started: u64,
    pub spam_rejected: u64,
    pub client_errors: u64,
    pub store_errors: u64,
    pub days_compiled: u64,
    pub days_skipped: u64,
    pub days_failed: u64,
    pub events_skipped: u64,
    pub months_reduced: u64,
    pub months_skipped: u64,
    pub months_failed: u64,
    pub days_deleted: u64,
    pub record_latency_mean_ms: f64,
    pub compile_latency_mean_ms: f64,
    pub blacklist_hosts: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            events_recorded: self.events_recorded.get(),
            pageviews_recorded: self.pageviews_recorded.get(),
            points_recorded: self.points_recorded.get(),
            sessions_started: self.sessions_started.get(),
            spam_rejected: self.spam_rejected.get(),
            client_errors: self.client_errors.get(),
            store_errors: self.store_errors.get(),
            days_compiled: self.days_compiled.get(),
            days_skipped: self.days_skipped.get(),
            days_failed: self.days_failed.get(),
            events_skipped: self.events_skipped.get(),
            months_reduced: self.months_reduced.get(),
            months_skipped: self.months_skipped.get(),
            months_failed: self.months_failed.get(),
            days_deleted: self.days_deleted.get(),
            record_latency_mean_ms: self.record_latency_ms.mean(),
            compile_latency_mean_ms: self.compile_latency_ms.mean(),
            blacklist_hosts: self.blacklist_hosts.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_buckets() {
        let h = Histogram::new();
        h.observe(0);
        h.observe(7);
        h.observe(120_000);
        assert_eq!(h.count(), 3);
        assert_eq!(h.sum(), 120_007);

        let buckets = h.buckets();
        assert_eq!(buckets[0], (1, 1));
        assert_eq!(buckets[2], (10, 1));
        assert_eq!(buckets[11], (60000, 1));
    }

    #[test]
    fn test_snapshot_reads_counters() {
        let m = Metrics::new();
        m.events_recorded.inc_by(3);
        m.spam_rejected.inc();
        m.blacklist_hosts.set(42);
        let snap = m.snapshot();
        assert_eq!(snap.events_recorded, 3);
        assert_eq!(snap.spam_rejected, 1);
        assert_eq!(snap.blacklist_hosts, 42);
        assert_eq!(snap.record_latency_mean_ms, 0.0);
    }
}
