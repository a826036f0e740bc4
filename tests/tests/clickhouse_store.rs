//! `ClickHouseStore` against a real ClickHouse.
//!
//! Requires Docker to be running, or `ANALYTICS_TEST_CLICKHOUSE_URL`
//! pointing at a server. Each test uses its own key prefix so tests can
//! share tables.

use chrono::Duration;
use clickhouse_client::{init_schema, ClickHouseClient, ClickHouseConfig, ClickHouseStore};
use counter_store::{CounterStore, WriteBatch};
use engine_core::sketch::observe_with_precision;
use engine_core::{
    AnalyticsConfig, CardinalitySketch, DayKeys, Dimension, ManualClock, RequestContext,
};
use integration_tests::containers::TestContainers;
use integration_tests::fixtures::{self, CHROME_UA, START_DAY};
use pipeline::{Accepted, Aggregator, Collector};
use std::sync::Arc;

struct ClickHouseContext {
    // Keeps the container alive for the test
    #[allow(dead_code)]
    containers: TestContainers,
    store: Arc<ClickHouseStore>,
    clock: ManualClock,
}

async fn setup() -> ClickHouseContext {
    let containers = TestContainers::start().await;
    let config = ClickHouseConfig {
        url: containers.clickhouse_url.clone(),
        database: containers.clickhouse_database.clone(),
        username: containers.clickhouse_username.clone(),
        password: containers.clickhouse_password.clone(),
        timeout_secs: 30,
    };
    let client = ClickHouseClient::new(config);
    init_schema(&client)
        .await
        .expect("Failed to initialize schema");

    let clock = ManualClock::new(fixtures::start_time());
    let store = Arc::new(ClickHouseStore::new(client, Arc::new(clock.clone())));
    ClickHouseContext {
        containers,
        store,
        clock,
    }
}

#[tokio::test]
async fn test_counters_and_hashes_sum() {
    let ctx = setup().await;
    let keys = DayKeys::new("ch-sum:");
    let pv = keys.pageviews(START_DAY);
    let paths = keys.dimension(Dimension::Path, START_DAY);

    for _ in 0..3 {
        let mut batch = WriteBatch::new();
        batch
            .incr(pv.clone(), 1)
            .hash_incr(paths.clone(), "/a", 1, None)
            .expire_if_unset(pv.clone(), Duration::days(1))
            .expire_if_unset(paths.clone(), Duration::days(1));
        ctx.store.apply(batch).await.expect("apply failed");
    }

    let counters = ctx
        .store
        .read_counters(&[pv.clone(), keys.pageviews("2000-01-01")])
        .await
        .unwrap();
    assert_eq!(counters[0].as_ref().unwrap(), &Some(3));
    assert_eq!(counters[1].as_ref().unwrap(), &None);

    let hashes = ctx.store.read_hashes(&[paths.clone()]).await.unwrap();
    let hash = hashes[0].as_ref().unwrap().clone().unwrap();
    assert_eq!(hash.get("/a"), Some(&3));

    // a hash key read as a counter is a per-key type error
    let mixed = ctx.store.read_counters(&[paths]).await.unwrap();
    assert!(mixed[0].is_err());
}

#[tokio::test]
async fn test_sketch_registers_round_trip() {
    let ctx = setup().await;
    let key = DayKeys::new("ch-uv:").visitors(START_DAY);

    let mut expected = CardinalitySketch::new();
    let mut batch = WriteBatch::new();
    for i in 0..500u32 {
        let token = format!("visitor-{}", i);
        expected.add(token.as_bytes());
        batch.register_max(
            key.clone(),
            observe_with_precision(token.as_bytes(), expected.precision()),
            expected.len(),
        );
    }
    ctx.store.apply(batch).await.expect("apply failed");

    let sketches = ctx.store.read_sketches(&[key]).await.unwrap();
    let bytes = sketches[0].as_ref().unwrap().clone().unwrap();
    let stored = CardinalitySketch::from_bytes(&bytes).unwrap();
    assert_eq!(stored, expected);
}

#[tokio::test]
async fn test_expired_keys_are_not_read() {
    let ctx = setup().await;
    let key = DayKeys::new("ch-ttl:").pageviews(START_DAY);

    let mut batch = WriteBatch::new();
    batch
        .incr(key.clone(), 1)
        .expire_if_unset(key.clone(), Duration::days(1));
    ctx.store.apply(batch).await.expect("apply failed");

    ctx.clock.advance(Duration::days(1) - Duration::seconds(1));
    let reads = ctx.store.read_counters(&[key.clone()]).await.unwrap();
    assert_eq!(reads[0].as_ref().unwrap(), &Some(1));

    ctx.clock.advance(Duration::seconds(2));
    let reads = ctx.store.read_counters(&[key]).await.unwrap();
    assert_eq!(reads[0].as_ref().unwrap(), &None);
}

#[tokio::test]
async fn test_pipeline_on_clickhouse() {
    let ctx = setup().await;
    let config = Arc::new(AnalyticsConfig::new(fixtures::MASTER_SECRET, "ch-e2e:"));
    let store: Arc<dyn CounterStore> = ctx.store.clone();
    let clock = Arc::new(ctx.clock.clone());

    let collector = Collector::new(config.clone(), store.clone(), clock.clone()).unwrap();
    let aggregator = Aggregator::new(config, store, clock).unwrap();

    for ip in ["192.0.2.1", "192.0.2.2", "192.0.2.1"] {
        let request = RequestContext {
            user_agent: Some(CHROME_UA.into()),
            client_ip: Some(ip.into()),
            ..Default::default()
        };
        let outcome = collector.ingest(br#"{"path":"/a"}"#, request).await.unwrap();
        assert_eq!(outcome, Accepted::Recorded);
    }

    let days = vec![START_DAY.to_string()];
    let series = aggregator.daily_series(&days).await;
    assert!(!series.partial);
    assert_eq!(series.data[0].pv, 3);
    assert_eq!(series.data[0].uv, 2);

    let top = aggregator.top_dimension(Dimension::Path, &days, 10).await;
    assert_eq!(top.data.len(), 1);
    assert_eq!(top.data[0].key, "/a");
    assert_eq!(top.data[0].count, 3);
}

#[tokio::test]
async fn test_late_hash_fields_expire_with_their_key() {
    let ctx = setup().await;
    let paths = DayKeys::new("ch-ttl-hash:").dimension(Dimension::Path, START_DAY);

    let mut first = WriteBatch::new();
    first
        .hash_incr(paths.clone(), "/early", 1, None)
        .expire_if_unset(paths.clone(), Duration::days(1));
    ctx.store.apply(first).await.expect("apply failed");

    // a new field later the same day carries a later expiry on its row
    ctx.clock.advance(Duration::hours(12));
    let mut later = WriteBatch::new();
    later
        .hash_incr(paths.clone(), "/late", 1, None)
        .expire_if_unset(paths.clone(), Duration::days(1));
    ctx.store.apply(later).await.expect("apply failed");

    let reads = ctx.store.read_hashes(&[paths.clone()]).await.unwrap();
    assert_eq!(reads[0].as_ref().unwrap().as_ref().map(|h| h.len()), Some(2));

    ctx.clock.advance(Duration::hours(12) + Duration::seconds(1));
    let reads = ctx.store.read_hashes(&[paths]).await.unwrap();
    assert_eq!(reads[0].as_ref().unwrap(), &None);
}
