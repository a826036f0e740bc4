//! Dashboard aggregation over day-keyed counters.
//!
//! Each family (pageviews, visitors, one dimension, perf) is read with one
//! batched store call covering the whole day list; families are read
//! concurrently. A day whose read fails counts as zero and is reported in
//! `failed_days` instead of failing the whole aggregate.

use counter_store::{CounterStore, KeyRead};
use engine_core::histogram::estimate_percentile;
use engine_core::limits::{DEFAULT_TOP_LIMIT, MAX_TOP_LIMIT};
use engine_core::{
    AnalyticsConfig, CardinalitySketch, DayKeys, Dimension, Error, PerfMetric, RangeToken,
    Result, SharedClock,
};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics;
use tracing::{debug, warn};

/// An aggregate plus which days could not be read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregated<T> {
    pub data: T,
    pub partial: bool,
    pub failed_days: Vec<String>,
}

impl<T> Aggregated<T> {
    fn new(data: T, failed_days: BTreeSet<String>) -> Self {
        Self {
            data,
            partial: !failed_days.is_empty(),
            failed_days: failed_days.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayPoint {
    pub day: String,
    pub pv: i64,
    pub uv: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionCount {
    pub key: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfSummary {
    pub total_count: i64,
    pub total_sum_ms: i64,
    pub avg_ms: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowPath {
    pub path: String,
    pub avg_ms: u64,
    pub count: i64,
}

/// Everything the dashboard overview shows for one range.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub range: RangeToken,
    pub days: usize,
    pub pageviews: i64,
    /// Sum of per-day unique visitor estimates. A visitor seen on three
    /// days of the range counts three times.
    pub visitor_days: u64,
    pub series: Vec<DayPoint>,
    pub top_paths: Vec<DimensionCount>,
    pub top_referrers: Vec<DimensionCount>,
    pub perf: PerfSummary,
}

/// Result of one batched family read, aligned with the day list.
struct FamilyRead<T> {
    values: Vec<Option<T>>,
    failed: Vec<bool>,
}

impl<T> FamilyRead<T> {
    fn settle(family: &'static str, requested: usize, result: Result<Vec<KeyRead<T>>>) -> Self {
        match result {
            Ok(reads) => {
                let mut values = Vec::with_capacity(requested);
                let mut failed = Vec::with_capacity(requested);
                let mut reads = reads.into_iter();
                for _ in 0..requested {
                    match reads.next() {
                        Some(Ok(value)) => {
                            values.push(value);
                            failed.push(false);
                        }
                        Some(Err(e)) => {
                            debug!(family, error = %e, "Day read failed");
                            values.push(None);
                            failed.push(true);
                        }
                        None => {
                            values.push(None);
                            failed.push(true);
                        }
                    }
                }
                Self { values, failed }
            }
            Err(e) => {
                metrics().store_read_errors.inc();
                warn!(family, error = %e, "Family read failed");
                Self {
                    values: (0..requested).map(|_| None).collect(),
                    failed: vec![true; requested],
                }
            }
        }
    }

    fn mark_failed(&mut self, i: usize) {
        if let Some(flag) = self.failed.get_mut(i) {
            *flag = true;
        }
    }
}

/// Days flagged in any of `flags`.
fn failed_days(days: &[String], flags: &[&[bool]]) -> BTreeSet<String> {
    days.iter()
        .enumerate()
        .filter(|(i, _)| flags.iter().any(|f| f.get(*i).copied().unwrap_or(false)))
        .map(|(_, day)| day.clone())
        .collect()
}

/// Sums per-day hashes into one running total.
fn merge_hashes(values: Vec<Option<HashMap<String, i64>>>) -> HashMap<String, i64> {
    let mut totals = HashMap::new();
    for (field, count) in values.into_iter().flatten().flatten() {
        *totals.entry(field).or_insert(0) += count;
    }
    totals
}

/// Count descending, key ascending, at most `limit`.
fn rank(totals: HashMap<String, i64>, limit: usize) -> Vec<DimensionCount> {
    let mut ranked: Vec<DimensionCount> = totals
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(key, count)| DimensionCount { key, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    ranked.truncate(limit);
    ranked
}

fn rounded_avg(sum: i64, count: i64) -> u64 {
    if count <= 0 || sum <= 0 {
        return 0;
    }
    (sum as f64 / count as f64).round() as u64
}

/// Clamps a requested top-N size.
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_TOP_LIMIT).clamp(1, MAX_TOP_LIMIT)
}

/// Read side of the analytics pipeline.
pub struct Aggregator {
    store: Arc<dyn CounterStore>,
    clock: SharedClock,
    keys: DayKeys,
}

impl Aggregator {
    /// Fails on an invalid configuration.
    pub fn new(
        config: Arc<AnalyticsConfig>,
        store: Arc<dyn CounterStore>,
        clock: SharedClock,
    ) -> Result<Self> {
        config.check()?;
        Ok(Self {
            keys: config.keys(),
            store,
            clock,
        })
    }

    /// Day list for `range`, ending today (UTC).
    pub fn days(&self, range: RangeToken) -> Vec<String> {
        range.resolve(self.clock.now())
    }

    fn finish<T>(
        &self,
        what: &str,
        start: Instant,
        days: &[String],
        data: T,
        failed: BTreeSet<String>,
    ) -> Aggregated<T> {
        metrics().aggregate_reads.inc();
        metrics()
            .aggregate_latency_ms
            .observe(start.elapsed().as_millis() as u64);

        if !failed.is_empty() {
            metrics().partial_aggregations.inc();
            let e = Error::PartialAggregation {
                failed: failed.len(),
                requested: days.len(),
            };
            warn!(aggregate = what, error = %e, "Partial aggregate");
        }
        Aggregated::new(data, failed)
    }

    /// Pageviews and unique visitors per day.
    pub async fn daily_series(&self, days: &[String]) -> Aggregated<Vec<DayPoint>> {
        let start = Instant::now();
        let (series, failed) = self.series_inner(days).await;
        self.finish("series", start, days, series, failed)
    }

    async fn series_inner(&self, days: &[String]) -> (Vec<DayPoint>, BTreeSet<String>) {
        let pv_keys = self.keys.for_days(days, DayKeys::pageviews);
        let uv_keys = self.keys.for_days(days, DayKeys::visitors);

        let (pv, uv) = tokio::join!(
            self.store.read_counters(&pv_keys),
            self.store.read_sketches(&uv_keys),
        );
        let pv = FamilyRead::settle("pv", days.len(), pv);
        let mut uv = FamilyRead::settle("uv", days.len(), uv);

        let mut series = Vec::with_capacity(days.len());
        for (i, day) in days.iter().enumerate() {
            let visitors = match uv.values[i].as_deref().map(CardinalitySketch::from_bytes) {
                Some(Ok(sketch)) => sketch.count(),
                Some(Err(e)) => {
                    debug!(day = %day, error = %e, "Unreadable visitor sketch");
                    uv.mark_failed(i);
                    0
                }
                None => 0,
            };
            series.push(DayPoint {
                day: day.clone(),
                pv: pv.values[i].unwrap_or(0),
                uv: visitors,
            });
        }

        let failed = failed_days(days, &[&pv.failed, &uv.failed]);
        (series, failed)
    }

    /// Most frequent values of `dim` across `days`.
    pub async fn top_dimension(
        &self,
        dim: Dimension,
        days: &[String],
        limit: usize,
    ) -> Aggregated<Vec<DimensionCount>> {
        let start = Instant::now();
        let (top, failed) = self.top_inner(dim, days, limit).await;
        self.finish(dim.as_str(), start, days, top, failed)
    }

    async fn top_inner(
        &self,
        dim: Dimension,
        days: &[String],
        limit: usize,
    ) -> (Vec<DimensionCount>, BTreeSet<String>) {
        let keys = self.keys.for_days(days, |k, day| k.dimension(dim, day));
        let read = FamilyRead::settle(dim.as_str(), days.len(), self.store.read_hashes(&keys).await);
        let failed = failed_days(days, &[&read.failed]);
        (rank(merge_hashes(read.values), limit.clamp(1, MAX_TOP_LIMIT)), failed)
    }

    /// Server-side duration totals and percentiles across `days`.
    pub async fn perf_summary(&self, days: &[String]) -> Aggregated<PerfSummary> {
        let start = Instant::now();
        let (perf, failed) = self.perf_inner(days).await;
        self.finish("perf", start, days, perf, failed)
    }

    async fn perf_inner(&self, days: &[String]) -> (PerfSummary, BTreeSet<String>) {
        let hist_keys = self.keys.for_days(days, |k, day| k.perf(PerfMetric::Histogram, day));
        let sum_keys = self.keys.for_days(days, |k, day| k.perf(PerfMetric::SumMs, day));
        let count_keys = self.keys.for_days(days, |k, day| k.perf(PerfMetric::Count, day));

        let (hist, sum, count) = tokio::join!(
            self.store.read_hashes(&hist_keys),
            self.store.read_counters(&sum_keys),
            self.store.read_counters(&count_keys),
        );
        let hist = FamilyRead::settle("perfhist", days.len(), hist);
        let sum = FamilyRead::settle("perfsum", days.len(), sum);
        let count = FamilyRead::settle("perfcount", days.len(), count);
        let failed = failed_days(days, &[&hist.failed, &sum.failed, &count.failed]);

        let total_sum_ms: i64 = sum.values.iter().flatten().sum();
        let total_count: i64 = count.values.iter().flatten().sum();
        let histogram = merge_hashes(hist.values);

        let perf = PerfSummary {
            total_count,
            total_sum_ms,
            avg_ms: rounded_avg(total_sum_ms, total_count),
            p50_ms: estimate_percentile(&histogram, 0.5),
            p95_ms: estimate_percentile(&histogram, 0.95),
        };
        (perf, failed)
    }

    /// Paths with the highest average duration across `days`.
    pub async fn slow_paths(&self, days: &[String], limit: usize) -> Aggregated<Vec<SlowPath>> {
        let start = Instant::now();
        let sum_keys = self.keys.for_days(days, |k, day| k.perf(PerfMetric::PathSumMs, day));
        let count_keys = self.keys.for_days(days, |k, day| k.perf(PerfMetric::PathCount, day));

        let (sums, counts) = tokio::join!(
            self.store.read_hashes(&sum_keys),
            self.store.read_hashes(&count_keys),
        );
        let sums = FamilyRead::settle("perfpathsum", days.len(), sums);
        let counts = FamilyRead::settle("perfpathcount", days.len(), counts);
        let failed = failed_days(days, &[&sums.failed, &counts.failed]);

        let sums = merge_hashes(sums.values);
        let mut paths: Vec<SlowPath> = merge_hashes(counts.values)
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(path, count)| SlowPath {
                avg_ms: rounded_avg(sums.get(&path).copied().unwrap_or(0), count),
                path,
                count,
            })
            .collect();
        paths.sort_by(|a, b| b.avg_ms.cmp(&a.avg_ms).then_with(|| a.path.cmp(&b.path)));
        paths.truncate(limit.clamp(1, MAX_TOP_LIMIT));

        self.finish("slow_paths", start, days, paths, failed)
    }

    /// Dashboard overview for `range`.
    pub async fn summary(&self, range: RangeToken, limit: usize) -> Aggregated<Summary> {
        let start = Instant::now();
        let days = self.days(range);

        let ((series, f1), (top_paths, f2), (top_referrers, f3), (perf, f4)) = tokio::join!(
            self.series_inner(&days),
            self.top_inner(Dimension::Path, &days, limit),
            self.top_inner(Dimension::Referrer, &days, limit),
            self.perf_inner(&days),
        );

        let summary = Summary {
            range,
            days: days.len(),
            pageviews: series.iter().map(|p| p.pv).sum(),
            visitor_days: series.iter().map(|p| p.uv).sum(),
            series,
            top_paths,
            top_referrers,
            perf,
        };
        let failed = f1.into_iter().chain(f2).chain(f3).chain(f4).collect();
        self.finish("summary", start, &days, summary, failed)
    }
}
