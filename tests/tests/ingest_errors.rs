//! Error handling on the ingest endpoint.
//!
//! The endpoint answers 201, 200 or 400 and nothing else: malformed bodies
//! are 400, store trouble is swallowed into `200 {accepted:false}`.

use axum::http::StatusCode;
use engine_core::limits::MAX_INGEST_BODY_BYTES;
use integration_tests::{
    fixtures::{self, CHROME_UA},
    setup::{send_pageview, TestContext},
};
use serde_json::Value;

async fn post_raw(ctx: &TestContext, body: &str) -> (StatusCode, Value) {
    let response = ctx
        .server()
        .post("/analytics/collect")
        .content_type("application/json")
        .add_header("X-Forwarded-For", "203.0.113.60")
        .add_header("User-Agent", CHROME_UA)
        .text(body.to_string())
        .await;
    (response.status_code(), response.json())
}

#[tokio::test]
async fn test_malformed_bodies_return_400() {
    let ctx = TestContext::new();

    for body in ["{not json", "[1,2,3]", "\"/home\"", r#"{"path":42}"#, r#"{"utm":[]}"#] {
        let (status, json) = post_raw(&ctx, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {}", body);
        assert_eq!(json["accepted"], false);
    }
    assert_eq!(ctx.store.write_count(), 0);
}

#[tokio::test]
async fn test_oversized_body_returns_400() {
    let ctx = TestContext::new();
    let body = format!(r#"{{"path":"/{}"}}"#, "a".repeat(MAX_INGEST_BODY_BYTES));

    let (status, json) = post_raw(&ctx, &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["accepted"], false);
}

#[tokio::test]
async fn test_empty_body_counts_as_root() {
    let ctx = TestContext::new();

    let (status, json) = post_raw(&ctx, "").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["accepted"], true);
    assert_eq!(ctx.store.write_count(), 1);
}

#[tokio::test]
async fn test_excluded_path_counts_as_root() {
    let ctx = TestContext::new();
    let status = send_pageview(
        &ctx.server(),
        &fixtures::pageview("/admin/settings"),
        "203.0.113.61",
        CHROME_UA,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_strict_config_rejects_invalid_paths() {
    let ctx = TestContext::with_config(fixtures::analytics_config().with_reject_invalid_paths(true));
    let server = ctx.server();

    let status =
        send_pageview(&server, &fixtures::pageview("/api/secret"), "203.0.113.62", CHROME_UA).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let status = send_pageview(&server, &fixtures::pageview("/ok"), "203.0.113.62", CHROME_UA).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_store_failure_is_swallowed() {
    let ctx = TestContext::new();
    ctx.store.set_fail_writes(true);

    let (status, json) = post_raw(&ctx, r#"{"path":"/"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["accepted"], false);

    ctx.store.set_fail_writes(false);
    let (status, _) = post_raw(&ctx, r#"{"path":"/"}"#).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ctx.store.write_count(), 1);
}

#[tokio::test]
async fn test_missing_client_ip_still_counts_pageview() {
    let ctx = TestContext::new();
    let response = ctx
        .server()
        .post("/analytics/collect")
        .add_header("User-Agent", CHROME_UA)
        .json(&fixtures::pageview("/"))
        .await;
    response.assert_status(StatusCode::CREATED);
    assert_eq!(ctx.store.write_count(), 1);
}
