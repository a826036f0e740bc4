//! Retention manager.
//!
//! Every key a batch writes gets an expire-if-unset op, so the first write
//! of a day starts that key's TTL and later writes leave it alone.

use counter_store::WriteBatch;
use engine_core::{AnalyticsConfig, Result, RetentionPolicy};

/// Attaches TTLs to write batches.
#[derive(Debug, Clone, Copy)]
pub struct RetentionManager {
    policy: RetentionPolicy,
}

impl RetentionManager {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    pub fn from_config(config: &AnalyticsConfig) -> Result<Self> {
        Ok(Self::new(config.retention()?))
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Adds a TTL for every key written by `batch`.
    pub fn attach(&self, batch: &mut WriteBatch) {
        let ttl = self.policy.ttl();
        for key in batch.written_keys() {
            batch.expire_if_unset(key, ttl);
        }
    }
}
