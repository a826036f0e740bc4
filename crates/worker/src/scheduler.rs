//! Worker scheduler for background tasks.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};

use counter_store::CounterStore;
use telemetry::health;

use crate::probe::StoreProbe;
use crate::retention::RetentionSweeper;

/// Worker scheduler configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Expired-key sweep interval
    pub sweep_interval: Duration,
    /// Store health probe interval
    pub probe_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(3600), // 1 hour
            probe_interval: Duration::from_secs(15),
        }
    }
}

/// Background worker scheduler.
pub struct WorkerScheduler {
    config: WorkerConfig,
    store: Arc<dyn CounterStore>,
}

impl WorkerScheduler {
    pub fn new(config: WorkerConfig, store: Arc<dyn CounterStore>) -> Self {
        Self { config, store }
    }

    /// Starts all background workers.
    pub fn start(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_retention_sweeper().await;
        }));

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_store_probe().await;
        }));

        health().worker.set_healthy();
        info!(store = self.store.name(), "Background workers started");
        handles
    }

    async fn run_retention_sweeper(&self) {
        let sweeper = RetentionSweeper::new(self.store.clone());
        let mut ticker = interval(self.config.sweep_interval);

        loop {
            ticker.tick().await;

            if let Err(e) = sweeper.run().await {
                error!(error = %e, "Retention sweep failed");
            }
        }
    }

    async fn run_store_probe(&self) {
        let probe = StoreProbe::new(self.store.clone());
        let mut ticker = interval(self.config.probe_interval);

        loop {
            ticker.tick().await;
            probe.run().await;
        }
    }
}
