//! Application state shared across handlers.

use counter_store::CounterStore;
use pipeline::{Aggregator, Collector};
use std::sync::Arc;

use crate::sessions::AdminSessions;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<Collector>,
    pub aggregator: Arc<Aggregator>,
    /// Counter store (memory in tests, ClickHouse in production)
    pub store: Arc<dyn CounterStore>,
    pub sessions: Arc<dyn AdminSessions>,
}

impl AppState {
    pub fn new(
        collector: Arc<Collector>,
        aggregator: Arc<Aggregator>,
        store: Arc<dyn CounterStore>,
        sessions: Arc<dyn AdminSessions>,
    ) -> Self {
        Self {
            collector,
            aggregator,
            store,
            sessions,
        }
    }
}
