//! Health and metrics endpoints.
//!
//! The health registry is process-global, so only one test here flips the
//! store component; the others assert on shape.

use axum::http::StatusCode;
use counter_store::CounterStore;
use integration_tests::{
    fixtures::{self, CHROME_UA},
    setup::{send_pageview, TestContext},
};
use std::sync::Arc;
use telemetry::{health, metrics};
use worker::StoreProbe;

#[tokio::test]
async fn test_health_endpoint_structure() {
    let ctx = TestContext::new();
    let response = ctx.server().get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["store"], "flaky-memory");
    let status = body["status"].as_str().unwrap_or("");
    assert!(
        ["healthy", "degraded", "unhealthy"].contains(&status),
        "unexpected status '{}'",
        status
    );
    let components = body["components"].as_array().unwrap();
    assert!(components.iter().any(|c| c["name"] == "store"));
}

#[tokio::test]
async fn test_live_endpoint() {
    let ctx = TestContext::new();
    ctx.server()
        .get("/health/live")
        .await
        .assert_status(StatusCode::OK);
}

/// Readiness follows the store probe.
#[tokio::test]
async fn test_ready_follows_store_probe() {
    let ctx = TestContext::new();
    let server = ctx.server();
    let store: Arc<dyn CounterStore> = ctx.store.clone();
    let probe = StoreProbe::new(store);

    ctx.store.set_fail_reads(true);
    assert!(!probe.run().await);
    server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert!(!health().report().status.is_healthy());

    ctx.store.set_fail_reads(false);
    assert!(probe.run().await);
    server.get("/health/ready").await.assert_status_ok();
}

#[tokio::test]
async fn test_metrics_count_ingests() {
    let ctx = TestContext::new();
    let server = ctx.server();
    let before = metrics().events_recorded.get();

    send_pageview(&server, &fixtures::pageview("/"), "203.0.113.80", CHROME_UA).await;

    let response = server.get("/metrics").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body["events_recorded"].as_u64().unwrap() > before);
    assert!(body.get("partial_aggregations").is_some());
}

#[tokio::test]
async fn test_health_endpoints_no_auth_required() {
    let ctx = TestContext::new();
    let server = ctx.server();

    for path in ["/health", "/health/live", "/metrics"] {
        assert_ne!(
            server.get(path).await.status_code(),
            StatusCode::UNAUTHORIZED,
            "{} should not require auth",
            path
        );
    }
}
