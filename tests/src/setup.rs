//! Common test setup functions.

use api::{router, AppState, HeaderTokenSessions};
use axum::Router;
use axum_test::TestServer;
use chrono::Duration;
use counter_store::CounterStore;
use engine_core::{AnalyticsConfig, ManualClock, SharedClock};
use pipeline::{Aggregator, Collector};
use std::sync::Arc;

use crate::fixtures;
use crate::mocks::FlakyStore;

/// Test context with the real router, a failure-injecting memory store and
/// a manual clock shared by every component.
///
/// This runs the same production code paths as the binary:
/// - the real Axum router with all layers
/// - the real Collector and Aggregator
/// - a `CounterStore` implementation with TTL driven by the manual clock
pub struct TestContext {
    pub store: Arc<FlakyStore>,
    pub clock: ManualClock,
    pub config: Arc<AnalyticsConfig>,
    pub router: Router,
}

impl TestContext {
    /// Context at [`fixtures::start_time`] with the default test config.
    pub fn new() -> Self {
        Self::with_config(fixtures::analytics_config())
    }

    pub fn with_config(config: AnalyticsConfig) -> Self {
        let clock = ManualClock::new(fixtures::start_time());
        let shared: SharedClock = Arc::new(clock.clone());
        let config = Arc::new(config);

        let store = Arc::new(FlakyStore::new(shared.clone()));
        let dyn_store: Arc<dyn CounterStore> = store.clone();

        let collector = Arc::new(
            Collector::new(config.clone(), dyn_store.clone(), shared.clone())
                .expect("Failed to create collector"),
        );
        let aggregator = Arc::new(
            Aggregator::new(config.clone(), dyn_store.clone(), shared)
                .expect("Failed to create aggregator"),
        );
        let sessions = Arc::new(HeaderTokenSessions::new(Some(fixtures::ADMIN_TOKEN)));

        let state = AppState::new(collector, aggregator, dyn_store, sessions);

        Self {
            store,
            clock,
            config,
            router: router(state),
        }
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.router.clone()).expect("Failed to create test server")
    }

    /// Moves every component's clock forward.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends one pageview from `ip` with `user_agent`, returning the status code.
pub async fn send_pageview(
    server: &TestServer,
    body: &serde_json::Value,
    ip: &str,
    user_agent: &str,
) -> axum::http::StatusCode {
    server
        .post("/analytics/collect")
        .add_header("X-Forwarded-For", ip)
        .add_header("User-Agent", user_agent)
        .add_header("Accept-Language", "en-GB,en;q=0.9")
        .json(body)
        .await
        .status_code()
}
