//! Latency buckets and percentile estimation.
//!
//! Durations are recorded as counts per fixed bucket, never as raw samples.
//! Percentiles are read back as the upper bound of the bucket that reaches
//! the target rank, which over-estimates rather than interpolates.

use std::collections::HashMap;

/// Inclusive upper bounds of the fixed buckets, in milliseconds.
pub const BUCKET_BOUNDS_MS: [u64; 9] = [25, 50, 100, 200, 400, 800, 1500, 3000, 6000];

/// Labels in ascending order; the last one is open-ended.
pub const BUCKET_LABELS: [&str; 10] = [
    "0-25",
    "26-50",
    "51-100",
    "101-200",
    "201-400",
    "401-800",
    "801-1500",
    "1501-3000",
    "3001-6000",
    "6001+",
];

/// Label of the bucket `duration_ms` falls into.
pub fn bucket_label(duration_ms: u64) -> &'static str {
    let idx = BUCKET_BOUNDS_MS
        .iter()
        .position(|&upper| duration_ms <= upper)
        .unwrap_or(BUCKET_BOUNDS_MS.len());
    BUCKET_LABELS[idx]
}

/// Parsed bucket label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// `"a-b"`: inclusive upper bound `b`.
    Upper(u64),
    /// `"N+"`: no upper bound; `N` is the smallest value it holds.
    Open(u64),
}

impl Bound {
    /// Parses `"a-b"` or `"N+"`; anything else is `None`.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        if let Some(lower) = label.strip_suffix('+') {
            return lower.trim().parse().ok().map(Bound::Open);
        }
        let (_, upper) = label.split_once('-')?;
        upper.trim().parse().ok().map(Bound::Upper)
    }

    fn sort_key(&self) -> (u8, u64) {
        match self {
            Bound::Upper(upper) => (0, *upper),
            Bound::Open(lower) => (1, *lower),
        }
    }
}

/// Estimates the `p`-th percentile (`0.0 < p <= 1.0`) of a bucket histogram.
///
/// Returns `None` when the histogram holds no samples. Unparseable labels and
/// non-positive counts are ignored. When the target rank lands in the
/// open-ended bucket the result is that bucket's lower bound.
pub fn estimate_percentile(histogram: &HashMap<String, i64>, p: f64) -> Option<u64> {
    let mut buckets: Vec<(Bound, i64)> = histogram
        .iter()
        .filter(|(_, &count)| count > 0)
        .filter_map(|(label, &count)| Bound::parse(label).map(|bound| (bound, count)))
        .collect();
    buckets.sort_by_key(|(bound, _)| bound.sort_key());

    let total: i64 = buckets.iter().map(|(_, count)| count).sum();
    if total <= 0 {
        return None;
    }

    let p = p.clamp(0.0, 1.0);
    let target = ((total as f64 * p).ceil() as i64).max(1);

    let mut cumulative = 0i64;
    for (bound, count) in &buckets {
        cumulative += count;
        if cumulative >= target {
            return Some(match bound {
                Bound::Upper(upper) => *upper,
                Bound::Open(lower) => *lower,
            });
        }
    }

    buckets.last().map(|(bound, _)| match bound {
        Bound::Upper(upper) => *upper,
        Bound::Open(lower) => *lower,
    })
}
