//! Retention policy for day-keyed counters.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::limits::{DEFAULT_TTL_SECONDS, MIN_TTL_SECONDS};

/// How long a day's counter set lives after its first write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    ttl_seconds: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }
}

impl RetentionPolicy {
    /// Creates a policy; TTLs shorter than a day would expire today's counters.
    pub fn new(ttl_seconds: u64) -> Result<Self> {
        if ttl_seconds < MIN_TTL_SECONDS {
            return Err(Error::configuration(format!(
                "ttl_seconds must be at least {}, got {}",
                MIN_TTL_SECONDS, ttl_seconds
            )));
        }
        Ok(Self { ttl_seconds })
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_seconds.min(i64::MAX as u64) as i64)
    }

    /// Expiry instant for a key first written at `written_at`.
    pub fn expires_at(&self, written_at: DateTime<Utc>) -> DateTime<Utc> {
        written_at
            .checked_add_signed(self.ttl())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether a key first written at `written_at` is gone at `now`.
    pub fn is_expired(&self, written_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now >= self.expires_at(written_at)
    }
}
