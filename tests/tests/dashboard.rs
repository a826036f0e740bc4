//! Dashboard read endpoints: access control, range handling, partial data.

use axum::http::StatusCode;
use axum_test::TestServer;
use integration_tests::{
    fixtures::{self, CHROME_UA, START_DAY},
    setup::{send_pageview, TestContext},
};
use serde_json::Value;

async fn admin_get(server: &TestServer, path: &str, query: &[(&str, &str)]) -> Value {
    let mut request = server
        .get(path)
        .add_header("Authorization", &fixtures::admin_bearer());
    for (name, value) in query {
        request = request.add_query_param(name, value);
    }
    let response = request.await;
    response.assert_status_ok();
    response.json()
}

async fn timed_pageview(server: &TestServer, path: &str, ms: u64) {
    server
        .post("/analytics/collect")
        .add_header("X-Forwarded-For", "203.0.113.70")
        .add_header("User-Agent", CHROME_UA)
        .add_header("X-Render-Duration-Ms", &ms.to_string())
        .json(&fixtures::pageview(path))
        .await
        .assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn test_reads_require_admin_session() {
    let ctx = TestContext::new();
    let server = ctx.server();

    for path in [
        "/analytics/summary",
        "/analytics/series",
        "/analytics/top/path",
        "/analytics/perf",
        "/analytics/slow-paths",
    ] {
        let response = server.get(path).await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        let response = server
            .get(path)
            .add_header("Authorization", "Bearer not-the-token")
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    let response = server
        .get("/analytics/summary")
        .add_header("Cookie", &format!("admin_session={}", fixtures::ADMIN_TOKEN))
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_range_defaults_and_caps() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let series = admin_get(&server, "/analytics/series", &[]).await;
    assert_eq!(series["range"], "30d");
    assert_eq!(series["data"].as_array().unwrap().len(), 30);

    let series = admin_get(&server, "/analytics/series", &[("range", "bogus")]).await;
    assert_eq!(series["range"], "30d");

    let series = admin_get(&server, "/analytics/series", &[("range", "all")]).await;
    let days = series["data"].as_array().unwrap();
    assert_eq!(days.len(), 365);
    assert_eq!(days.last().unwrap()["day"], START_DAY);
    assert!(days[0]["day"].as_str().unwrap() < days[1]["day"].as_str().unwrap());
}

#[tokio::test]
async fn test_unknown_dimension_is_400() {
    let ctx = TestContext::new();
    let response = ctx
        .server()
        .get("/analytics/top/shoe-size")
        .add_header("Authorization", &fixtures::admin_bearer())
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "VALID_001");
}

#[tokio::test]
async fn test_top_limit_and_ordering() {
    let ctx = TestContext::new();
    let server = ctx.server();

    for (path, views) in [("/c", 1), ("/b", 2), ("/a", 2), ("/d", 3)] {
        for _ in 0..views {
            send_pageview(&server, &fixtures::pageview(path), "203.0.113.71", CHROME_UA).await;
        }
    }

    let top = admin_get(&server, "/analytics/top/path", &[("range", "7d"), ("limit", "3")]).await;
    assert_eq!(
        top["data"],
        serde_json::json!([
            { "key": "/d", "count": 3 },
            { "key": "/a", "count": 2 },
            { "key": "/b", "count": 2 },
        ])
    );
}

#[tokio::test]
async fn test_perf_summary_and_slow_paths() {
    let ctx = TestContext::new();
    let server = ctx.server();

    for ms in [10, 20, 30, 40] {
        timed_pageview(&server, "/fast", ms).await;
    }
    timed_pageview(&server, "/slow", 7000).await;

    let perf = admin_get(&server, "/analytics/perf", &[("range", "7d")]).await;
    assert_eq!(perf["data"]["totalCount"], 5);
    assert_eq!(perf["data"]["totalSumMs"], 7100);
    assert_eq!(perf["data"]["avgMs"], 1420);
    assert_eq!(perf["data"]["p50Ms"], 50);
    // lands in the open-ended bucket
    assert_eq!(perf["data"]["p95Ms"], 6001);

    let slow = admin_get(&server, "/analytics/slow-paths", &[("range", "7d")]).await;
    assert_eq!(
        slow["data"],
        serde_json::json!([
            { "path": "/slow", "avgMs": 7000, "count": 1 },
            { "path": "/fast", "avgMs": 25, "count": 4 },
        ])
    );
}

#[tokio::test]
async fn test_summary_overview() {
    let ctx = TestContext::new();
    let server = ctx.server();

    send_pageview(&server, &fixtures::pageview("/x"), "203.0.113.72", CHROME_UA).await;
    send_pageview(&server, &fixtures::pageview("/x"), "203.0.113.73", CHROME_UA).await;

    let summary = admin_get(&server, "/analytics/summary", &[("range", "7d")]).await;
    assert_eq!(summary["partial"], false);
    assert_eq!(summary["data"]["range"], "7d");
    assert_eq!(summary["data"]["days"], 7);
    assert_eq!(summary["data"]["pageviews"], 2);
    assert_eq!(summary["data"]["visitorDays"], 2);
    assert_eq!(summary["data"]["topPaths"][0]["key"], "/x");
    assert_eq!(summary["data"]["topReferrers"][0]["key"], "direct");
    assert_eq!(summary["data"]["perf"]["totalCount"], 0);
    assert_eq!(summary["data"]["perf"]["p50Ms"], Value::Null);
}

#[tokio::test]
async fn test_failed_day_renders_partial() {
    let ctx = TestContext::new();
    let server = ctx.server();

    send_pageview(&server, &fixtures::pageview("/"), "203.0.113.74", CHROME_UA).await;
    ctx.store.break_day(Some(START_DAY));

    let series = admin_get(&server, "/analytics/series", &[("range", "7d")]).await;
    assert_eq!(series["partial"], true);
    assert_eq!(series["failedDays"], serde_json::json!([START_DAY]));
    assert_eq!(series["data"][6]["pv"], 0);
}

#[tokio::test]
async fn test_store_outage_still_answers_200() {
    let ctx = TestContext::new();
    let server = ctx.server();
    ctx.store.set_fail_reads(true);

    let summary = admin_get(&server, "/analytics/summary", &[("range", "7d")]).await;
    assert_eq!(summary["partial"], true);
    assert_eq!(summary["failedDays"].as_array().unwrap().len(), 7);
    assert_eq!(summary["data"]["pageviews"], 0);
    assert_eq!(summary["data"]["topPaths"], serde_json::json!([]));
}
