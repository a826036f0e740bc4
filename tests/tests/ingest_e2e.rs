//! End-to-end tests for the pageview pipeline.
//!
//! POST /analytics/collect → Collector → counter store → Aggregator →
//! dashboard endpoints, all on one manual clock.

use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::Duration;
use integration_tests::{
    fixtures::{self, BOT_UA, CHROME_UA, IPHONE_UA, START_DAY},
    setup::{send_pageview, TestContext},
};
use serde_json::Value;

async fn series(server: &TestServer, range: &str) -> Value {
    let response = server
        .get("/analytics/series")
        .add_query_param("range", range)
        .add_header("Authorization", &fixtures::admin_bearer())
        .await;
    response.assert_status_ok();
    response.json()
}

async fn top(server: &TestServer, dimension: &str) -> Value {
    let response = server
        .get(&format!("/analytics/top/{}", dimension))
        .add_query_param("range", "7d")
        .add_header("Authorization", &fixtures::admin_bearer())
        .await;
    response.assert_status_ok();
    response.json()
}

fn last_day(series: &Value) -> &Value {
    series["data"]
        .as_array()
        .and_then(|days| days.last())
        .expect("series should not be empty")
}

/// Three pageviews to /a from two visitors, one of them twice.
#[tokio::test]
async fn test_three_pageviews_two_visitors() {
    let ctx = TestContext::new();
    let server = ctx.server();
    let body = fixtures::pageview("/a");

    for ip in ["203.0.113.10", "203.0.113.11", "203.0.113.10"] {
        let status = send_pageview(&server, &body, ip, CHROME_UA).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let series = series(&server, "7d").await;
    assert_eq!(series["partial"], false);
    let today = last_day(&series);
    assert_eq!(today["day"], START_DAY);
    assert_eq!(today["pv"], 3);
    assert_eq!(today["uv"], 2);

    let paths = top(&server, "path").await;
    assert_eq!(paths["data"], serde_json::json!([{ "key": "/a", "count": 3 }]));
}

/// Same IP on a different device class is a different visitor.
#[tokio::test]
async fn test_device_class_separates_visitors() {
    let ctx = TestContext::new();
    let server = ctx.server();
    let body = fixtures::pageview("/");

    send_pageview(&server, &body, "203.0.113.20", CHROME_UA).await;
    send_pageview(&server, &body, "203.0.113.20", IPHONE_UA).await;

    let series = series(&server, "7d").await;
    assert_eq!(last_day(&series)["uv"], 2);

    let devices = top(&server, "device").await;
    let keys: Vec<&str> = devices["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["desktop", "mobile"]);
}

#[tokio::test]
async fn test_classified_dimensions_are_recorded() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server
        .post("/analytics/collect")
        .add_header("X-Forwarded-For", "198.51.100.7")
        .add_header("User-Agent", CHROME_UA)
        .add_header("Accept-Language", "pt-BR,pt;q=0.9")
        .add_header("Referer", "https://www.google.com/search?q=x")
        .add_header("CF-IPCountry", "BR")
        .json(&fixtures::campaign_pageview("/Pricing?ref=1", "Newsletter", "launch"))
        .await;
    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.json::<Value>()["accepted"], true);

    assert_eq!(top(&server, "path").await["data"][0]["key"], "/pricing");
    assert_eq!(top(&server, "ref").await["data"][0]["key"], "www.google.com");
    assert_eq!(top(&server, "utm_source").await["data"][0]["key"], "newsletter");
    assert_eq!(top(&server, "utm_campaign").await["data"][0]["key"], "launch");
    assert_eq!(top(&server, "lang").await["data"][0]["key"], "pt");
    assert_eq!(top(&server, "browser").await["data"][0]["key"], "chrome");
    assert_eq!(top(&server, "os").await["data"][0]["key"], "windows");
    assert_eq!(top(&server, "country").await["data"][0]["key"], "br");
    assert_eq!(top(&server, "utm_medium").await["data"], serde_json::json!([]));
}

#[tokio::test]
async fn test_bots_are_accepted_but_not_counted() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let status = send_pageview(&server, &fixtures::pageview("/"), "66.249.66.1", BOT_UA).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ctx.store.write_count(), 0);

    let series = series(&server, "7d").await;
    assert_eq!(last_day(&series)["pv"], 0);
}

#[tokio::test]
async fn test_admin_sessions_are_not_counted() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server
        .post("/analytics/collect")
        .add_header("X-Forwarded-For", "203.0.113.30")
        .add_header("User-Agent", CHROME_UA)
        .add_header("Cookie", &format!("admin_session={}", fixtures::ADMIN_TOKEN))
        .json(&fixtures::pageview("/"))
        .await;

    response.assert_status(StatusCode::CREATED);
    assert_eq!(ctx.store.write_count(), 0);
}

#[tokio::test]
async fn test_pageviews_split_by_utc_day() {
    let ctx = TestContext::new();
    let server = ctx.server();
    let body = fixtures::pageview("/");

    send_pageview(&server, &body, "203.0.113.40", CHROME_UA).await;
    ctx.advance(Duration::days(1));
    send_pageview(&server, &body, "203.0.113.40", CHROME_UA).await;
    send_pageview(&server, &body, "203.0.113.41", CHROME_UA).await;

    let series = series(&server, "7d").await;
    let days = series["data"].as_array().unwrap();
    assert_eq!(days.len(), 7);

    let yesterday = &days[5];
    let today = &days[6];
    assert_eq!(yesterday["day"], START_DAY);
    assert_eq!(yesterday["pv"], 1);
    assert_eq!(yesterday["uv"], 1);
    assert_eq!(today["pv"], 2);
    assert_eq!(today["uv"], 2);
}

/// Counters are readable right after the first write and gone after the TTL.
#[tokio::test]
async fn test_counters_expire_after_ttl() {
    let ttl = 2 * 86_400;
    let ctx = TestContext::with_config(fixtures::analytics_config().with_ttl_seconds(ttl));
    let server = ctx.server();

    send_pageview(&server, &fixtures::pageview("/"), "203.0.113.50", CHROME_UA).await;
    let series_now = series(&server, "7d").await;
    assert_eq!(last_day(&series_now)["pv"], 1);

    ctx.advance(Duration::seconds(ttl as i64 - 1));
    let before = series(&server, "7d").await;
    assert_eq!(before["data"][4]["day"], START_DAY);
    assert_eq!(before["data"][4]["pv"], 1);

    ctx.advance(Duration::seconds(2));
    let after = series(&server, "7d").await;
    assert_eq!(after["data"][4]["pv"], 0);
    assert_eq!(after["partial"], false);
}

/// Characters dropped by sanitizing cannot smuggle an excluded prefix in.
#[tokio::test]
async fn test_obfuscated_admin_paths_are_never_recorded() {
    let ctx = TestContext::new();
    let server = ctx.server();

    for path in ["/ad min/x", "/a<p>i/orders", "/admin!/settings"] {
        let status =
            send_pageview(&server, &fixtures::pageview(path), "203.0.113.90", CHROME_UA).await;
        assert_eq!(status, StatusCode::CREATED, "path {}", path);
    }

    let paths = top(&server, "path").await;
    let keys: Vec<&str> = paths["data"]
        .as_array()
        .expect("top paths should be an array")
        .iter()
        .filter_map(|entry| entry["key"].as_str())
        .collect();
    assert_eq!(keys, vec!["/"]);
    assert_eq!(paths["data"][0]["count"], 3);
}

#[tokio::test]
async fn test_obfuscated_admin_path_writes_nothing_in_strict_mode() {
    let ctx =
        TestContext::with_config(fixtures::analytics_config().with_reject_invalid_paths(true));
    let server = ctx.server();

    let status =
        send_pageview(&server, &fixtures::pageview("/ad min/x"), "203.0.113.91", CHROME_UA).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(ctx.store.write_count(), 0);
}

/// Only the hop appended by the trusted proxy identifies the visitor.
#[tokio::test]
async fn test_spoofed_forwarded_for_does_not_inflate_visitors() {
    let ctx = TestContext::new();
    let server = ctx.server();
    let body = fixtures::pageview("/a");

    for forwarded in ["192.0.2.1, 203.0.113.20", "192.0.2.2, 203.0.113.20", "203.0.113.20"] {
        let status = send_pageview(&server, &body, forwarded, CHROME_UA).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let series = series(&server, "7d").await;
    let today = last_day(&series);
    assert_eq!(today["pv"], 3);
    assert_eq!(today["uv"], 1);
}
