//! Retention sweeper.
//!
//! Expired keys are already invisible to reads; sweeping only frees their
//! memory. Stores with native TTL report zero.

use counter_store::CounterStore;
use engine_core::Result;
use std::sync::Arc;
use telemetry::metrics;
use tracing::{debug, info};

/// Worker that purges expired keys from the counter store.
pub struct RetentionSweeper {
    store: Arc<dyn CounterStore>,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Runs one sweep and returns the number of keys removed.
    pub async fn run(&self) -> Result<u64> {
        let removed = self.store.purge_expired().await?;
        metrics().keys_purged.inc_by(removed);

        if removed > 0 {
            info!(store = self.store.name(), removed, "Retention sweep removed expired keys");
        } else {
            debug!(store = self.store.name(), "Retention sweep found nothing to remove");
        }
        Ok(removed)
    }
}
