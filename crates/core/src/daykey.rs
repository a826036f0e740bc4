//! Day-partitioned key scheme and range expansion.
//!
//! Layout (all keys carry the namespace prefix and expire after the retention TTL):
//!
//! | Key | Kind |
//! |-----|------|
//! | `{prefix}pv:{day}` | counter |
//! | `{prefix}uv:{day}` | sketch |
//! | `{prefix}pv:{dimension}:{day}` | hash, one per dimension family |
//! | `{prefix}pv:perfhist:{day}` | hash bucket label -> count |
//! | `{prefix}pv:perfsum:{day}` / `{prefix}pv:perfcount:{day}` | counters |
//! | `{prefix}pv:perfpathsum:{day}` / `{prefix}pv:perfpathcount:{day}` | hashes keyed by path |

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::limits::MAX_RANGE_DAYS;

/// Date format used in every day key.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Dimension families recorded per pageview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Path,
    Referrer,
    UtmSource,
    UtmMedium,
    UtmCampaign,
    Device,
    Lang,
    Browser,
    Os,
    Country,
}

impl Dimension {
    /// Every dimension, in dashboard order.
    pub const ALL: [Dimension; 10] = [
        Self::Path,
        Self::Referrer,
        Self::UtmSource,
        Self::UtmMedium,
        Self::UtmCampaign,
        Self::Device,
        Self::Lang,
        Self::Browser,
        Self::Os,
        Self::Country,
    ];

    /// Key segment for this dimension.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Referrer => "ref",
            Self::UtmSource => "utm_source",
            Self::UtmMedium => "utm_medium",
            Self::UtmCampaign => "utm_campaign",
            Self::Device => "device",
            Self::Lang => "lang",
            Self::Browser => "browser",
            Self::Os => "os",
            Self::Country => "country",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let dim = match s {
            "path" => Self::Path,
            "ref" | "referrer" => Self::Referrer,
            "utm_source" => Self::UtmSource,
            "utm_medium" => Self::UtmMedium,
            "utm_campaign" => Self::UtmCampaign,
            "device" => Self::Device,
            "lang" => Self::Lang,
            "browser" => Self::Browser,
            "os" => Self::Os,
            "country" => Self::Country,
            other => return Err(Error::malformed(format!("unknown dimension: {}", other))),
        };
        Ok(dim)
    }
}

/// Per-path performance hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerfMetric {
    Histogram,
    SumMs,
    Count,
    PathSumMs,
    PathCount,
}

impl PerfMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Histogram => "perfhist",
            Self::SumMs => "perfsum",
            Self::Count => "perfcount",
            Self::PathSumMs => "perfpathsum",
            Self::PathCount => "perfpathcount",
        }
    }
}

/// Builds namespaced day keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayKeys {
    prefix: String,
}

impl DayKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `{prefix}pv:{day}`
    pub fn pageviews(&self, day: &str) -> String {
        format!("{}pv:{}", self.prefix, day)
    }

    /// `{prefix}uv:{day}`
    pub fn visitors(&self, day: &str) -> String {
        format!("{}uv:{}", self.prefix, day)
    }

    /// `{prefix}pv:{dimension}:{day}`
    pub fn dimension(&self, dim: Dimension, day: &str) -> String {
        format!("{}pv:{}:{}", self.prefix, dim.as_str(), day)
    }

    /// `{prefix}pv:{perf metric}:{day}`
    pub fn perf(&self, metric: PerfMetric, day: &str) -> String {
        format!("{}pv:{}:{}", self.prefix, metric.as_str(), day)
    }

    /// Maps `days` through `key_fn`, keeping day order.
    pub fn for_days<F>(&self, days: &[String], key_fn: F) -> Vec<String>
    where
        F: Fn(&Self, &str) -> String,
    {
        days.iter().map(|day| key_fn(self, day)).collect()
    }
}

/// UTC calendar day of `at`, as used in keys.
pub fn day_string(at: DateTime<Utc>) -> String {
    at.date_naive().format(DAY_FORMAT).to_string()
}

/// Parses a day key suffix back into a date.
pub fn parse_day(day: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(day, DAY_FORMAT)
        .map_err(|e| Error::malformed(format!("invalid day {}: {}", day, e)))
}

/// Lists `count` UTC days ending at `end`'s date, oldest first.
///
/// `count` is clamped to `1..=MAX_RANGE_DAYS`.
pub fn list_days(end: DateTime<Utc>, count: usize) -> Vec<String> {
    let count = count.clamp(1, MAX_RANGE_DAYS);
    let last = end.date_naive();

    (0..count)
        .rev()
        .map(|offset| {
            (last - Duration::days(offset as i64))
                .format(DAY_FORMAT)
                .to_string()
        })
        .collect()
}

/// Relative range accepted by dashboard reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RangeToken {
    #[serde(rename = "7d")]
    Week,
    #[default]
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
    #[serde(rename = "365d")]
    Year,
    #[serde(rename = "all")]
    All,
}

impl RangeToken {
    /// Number of days covered; `all` is capped like everything else.
    pub fn days(&self) -> usize {
        match self {
            Self::Week => 7,
            Self::Month => 30,
            Self::Quarter => 90,
            Self::Year => 365,
            Self::All => MAX_RANGE_DAYS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Week => "7d",
            Self::Month => "30d",
            Self::Quarter => "90d",
            Self::Year => "365d",
            Self::All => "all",
        }
    }

    /// Explicit day list for this range ending at `end`.
    pub fn resolve(&self, end: DateTime<Utc>) -> Vec<String> {
        list_days(end, self.days())
    }
}

impl FromStr for RangeToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "7d" => Ok(Self::Week),
            "30d" => Ok(Self::Month),
            "90d" => Ok(Self::Quarter),
            "365d" => Ok(Self::Year),
            "all" => Ok(Self::All),
            other => Err(Error::malformed(format!("unknown range: {}", other))),
        }
    }
}
