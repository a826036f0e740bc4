//! In-process metrics.
//!
//! Lock-free counters, gauges and latency histograms behind one global
//! registry. Exposed as a JSON snapshot on `/metrics`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic count.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Current level; never drops below zero.
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

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }
}

/// Upper bounds of the latency buckets, in milliseconds.
pub const LATENCY_BOUNDS_MS: [u64; 11] = [1, 2, 5, 10, 25, 50, 100, 250, 500, 1000, 5000];

/// Latency histogram in milliseconds.
///
/// Bounds are dense below the ingest write budget, where store round trips
/// are expected to land.
#[derive(Debug)]
pub struct Histogram {
    /// One slot per bound plus an overflow slot
    buckets: [AtomicU64; LATENCY_BOUNDS_MS.len() + 1],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let slot = LATENCY_BOUNDS_MS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(LATENCY_BOUNDS_MS.len());
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

    /// Upper bound of the bucket holding the `p` quantile; `None` when empty.
    /// Overflow reports one past the largest bound.
    pub fn quantile(&self, p: f64) -> Option<u64> {
        let counts: Vec<u64> = self
            .buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect();
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return None;
        }
        let target = ((total as f64 * p.clamp(0.0, 1.0)).ceil() as u64).max(1);

        let mut seen = 0;
        for (slot, count) in counts.iter().enumerate() {
            seen += count;
            if seen >= target {
                return Some(match LATENCY_BOUNDS_MS.get(slot) {
                    Some(&bound) => bound,
                    None => LATENCY_BOUNDS_MS[LATENCY_BOUNDS_MS.len() - 1] + 1,
                });
            }
        }
        None
    }

    /// `(upper bound, count)` per bounded bucket, then `(u64::MAX, overflow)`.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        LATENCY_BOUNDS_MS
            .iter()
            .copied()
            .chain(std::iter::once(u64::MAX))
            .zip(self.buckets.iter())
            .map(|(bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the analytics pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    // Ingest outcomes
    pub events_received: Counter,
    pub events_recorded: Counter,
    pub events_skipped_bot: Counter,
    pub events_skipped_admin: Counter,
    pub events_rejected: Counter,
    pub events_dropped: Counter,

    // Counter store
    pub store_writes: Counter,
    pub store_write_errors: Counter,
    pub store_read_errors: Counter,
    pub keys_purged: Counter,

    // Aggregation
    pub aggregate_reads: Counter,
    pub partial_aggregations: Counter,

    // Latency histograms
    pub ingest_latency_ms: Histogram,
    pub store_latency_ms: Histogram,
    pub aggregate_latency_ms: Histogram,

    // Gauges
    pub ingests_in_flight: Gauge,
    pub store_healthy: Gauge,
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
    pub events_received: u64,
    pub events_recorded: u64,
    pub events_skipped_bot: u64,
    pub events_skipped_admin: u64,
    pub events_rejected: u64,
    pub events_dropped: u64,
    pub store_writes: u64,
    pub store_write_errors: u64,
    pub store_read_errors: u64,
    pub keys_purged: u64,
    pub aggregate_reads: u64,
    pub partial_aggregations: u64,
    pub ingest_latency_mean_ms: f64,
    pub ingest_latency_p95_ms: Option<u64>,
    pub store_latency_mean_ms: f64,
    pub store_latency_p95_ms: Option<u64>,
    pub aggregate_latency_mean_ms: f64,
    pub ingests_in_flight: u64,
    pub store_healthy: bool,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            events_received: self.events_received.get(),
            events_recorded: self.events_recorded.get(),
            events_skipped_bot: self.events_skipped_bot.get(),
            events_skipped_admin: self.events_skipped_admin.get(),
            events_rejected: self.events_rejected.get(),
            events_dropped: self.events_dropped.get(),
            store_writes: self.store_writes.get(),
            store_write_errors: self.store_write_errors.get(),
            store_read_errors: self.store_read_errors.get(),
            keys_purged: self.keys_purged.get(),
            aggregate_reads: self.aggregate_reads.get(),
            partial_aggregations: self.partial_aggregations.get(),
            ingest_latency_mean_ms: self.ingest_latency_ms.mean(),
            ingest_latency_p95_ms: self.ingest_latency_ms.quantile(0.95),
            store_latency_mean_ms: self.store_latency_ms.mean(),
            store_latency_p95_ms: self.store_latency_ms.quantile(0.95),
            aggregate_latency_mean_ms: self.aggregate_latency_ms.mean(),
            ingests_in_flight: self.ingests_in_flight.get(),
            store_healthy: self.store_healthy.get() > 0,
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
