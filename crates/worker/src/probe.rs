//! Store health probe.

use counter_store::CounterStore;
use std::sync::Arc;
use telemetry::{health, metrics, HealthRegistry};
use tracing::{debug, warn};

/// Pings the counter store and records the result in the health registry.
pub struct StoreProbe {
    store: Arc<dyn CounterStore>,
    registry: &'static HealthRegistry,
}

impl StoreProbe {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self::with_registry(store, health())
    }

    pub fn with_registry(store: Arc<dyn CounterStore>, registry: &'static HealthRegistry) -> Self {
        Self { store, registry }
    }

    /// Runs one probe; returns whether the store answered.
    pub async fn run(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => {
                self.registry.store.set_healthy();
                metrics().store_healthy.set(1);
                debug!(store = self.store.name(), "Store healthy");
                true
            }
            Err(e) => {
                self.registry.store.set_unhealthy(e.to_string());
                metrics().store_healthy.set(0);
                warn!(
                    store = self.store.name(),
                    error = %e,
                    failures = self.registry.store.consecutive_failures(),
                    "Store unhealthy"
                );
                false
            }
        }
    }
}
