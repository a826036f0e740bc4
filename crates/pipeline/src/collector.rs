//! Pageview collector.
//!
//! Turns one ingest request into one write batch against the counter store.
//! The store write is best effort: failures and timeouts are logged and
//! counted, never surfaced to the page.

use counter_store::{CounterStore, WriteBatch};
use engine_core::classify::Classifier;
use engine_core::histogram::bucket_label;
use engine_core::privacy::{daily_secret, token_from_daily, DailySecret, VisitorToken};
use engine_core::sketch::{observe_with_precision, DEFAULT_PRECISION, DEFAULT_REGISTERS};
use engine_core::{
    day_string, AnalyticsConfig, DayKeys, Dimension, Error, IngestBody, PageviewEvent,
    PerfMetric, RequestContext, Result, SharedClock,
};
use moka::future::Cache;
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics;
use tracing::{debug, warn};

use crate::retention::RetentionManager;

/// Daily secrets kept around (today, yesterday around midnight).
const SECRET_CACHE_CAPACITY: u64 = 4;

/// Daily secrets are dropped well after their day ends.
const SECRET_CACHE_TTL: Duration = Duration::from_secs(2 * 86_400);

/// Why a well-formed pageview was not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Bot,
    AdminSession,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bot => "bot",
            Self::AdminSession => "admin",
        }
    }
}

/// Outcome of an accepted ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    /// Counters were updated.
    Recorded,
    /// Accepted but intentionally not counted.
    Skipped(SkipReason),
    /// Accepted but the store write failed or timed out.
    Dropped,
}

impl Accepted {
    /// `false` only when the event was lost to a store failure.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Dropped)
    }
}

/// Ingest rejected before anything was written.
#[derive(Debug)]
pub enum Rejected {
    BadRequest(Error),
}

impl Rejected {
    pub fn error(&self) -> &Error {
        match self {
            Self::BadRequest(e) => e,
        }
    }
}

impl std::fmt::Display for Rejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(e) => write!(f, "bad request: {}", e),
        }
    }
}

/// Pageview collector.
pub struct Collector {
    config: Arc<AnalyticsConfig>,
    store: Arc<dyn CounterStore>,
    clock: SharedClock,
    keys: DayKeys,
    classifier: Classifier,
    retention: RetentionManager,
    secrets: Cache<String, Arc<DailySecret>>,
}

impl Collector {
    /// Fails on an invalid configuration.
    pub fn new(
        config: Arc<AnalyticsConfig>,
        store: Arc<dyn CounterStore>,
        clock: SharedClock,
    ) -> Result<Self> {
        config.check()?;
        let retention = RetentionManager::from_config(&config)?;

        Ok(Self {
            keys: config.keys(),
            config,
            store,
            clock,
            classifier: Classifier::new(),
            retention,
            secrets: Cache::builder()
                .max_capacity(SECRET_CACHE_CAPACITY)
                .time_to_live(SECRET_CACHE_TTL)
                .build(),
        })
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Parses, classifies and records one raw ingest request.
    pub async fn ingest(
        &self,
        body: &[u8],
        ctx: RequestContext,
    ) -> std::result::Result<Accepted, Rejected> {
        let start = Instant::now();
        metrics().events_received.inc();
        metrics().ingests_in_flight.inc();

        let result = match IngestBody::parse(body)
            .and_then(|body| PageviewEvent::classify(body, ctx, &self.classifier, &self.config))
        {
            Ok(event) => Ok(self.ingest_event(&event).await),
            Err(e) => {
                metrics().events_rejected.inc();
                debug!(error = %e, "Rejected pageview");
                Err(Rejected::BadRequest(e))
            }
        };

        metrics().ingests_in_flight.dec();
        metrics()
            .ingest_latency_ms
            .observe(start.elapsed().as_millis() as u64);
        result
    }

    /// Records an already classified pageview.
    pub async fn ingest_event(&self, event: &PageviewEvent) -> Accepted {
        if event.is_bot {
            metrics().events_skipped_bot.inc();
            return Accepted::Skipped(SkipReason::Bot);
        }
        if event.is_admin {
            metrics().events_skipped_admin.inc();
            return Accepted::Skipped(SkipReason::AdminSession);
        }

        let day = day_string(self.clock.now());
        let token = match event.client_ip.as_deref() {
            Some(ip) => Some(self.visitor_token(&day, ip, event.device.as_str()).await),
            None => None,
        };

        let mut batch = self.build_batch(event, &day, token.as_ref());
        self.retention.attach(&mut batch);

        match tokio::time::timeout(self.config.store_timeout(), self.store.apply(batch)).await {
            Ok(Ok(())) => {
                metrics().store_writes.inc();
                metrics().events_recorded.inc();
                debug!(path = %event.path, day = %day, "Recorded pageview");
                Accepted::Recorded
            }
            Ok(Err(e)) => {
                metrics().store_write_errors.inc();
                metrics().events_dropped.inc();
                warn!(error = %e, store = self.store.name(), "Dropped pageview");
                Accepted::Dropped
            }
            Err(_) => {
                metrics().store_write_errors.inc();
                metrics().events_dropped.inc();
                warn!(
                    timeout_ms = self.config.store_timeout_ms,
                    store = self.store.name(),
                    "Dropped pageview, store write timed out"
                );
                Accepted::Dropped
            }
        }
    }

    async fn visitor_token(&self, day: &str, ip: &str, device: &str) -> VisitorToken {
        let master = self.config.master_secret.as_bytes();
        let secret = self
            .secrets
            .get_with(day.to_string(), async { Arc::new(daily_secret(master, day)) })
            .await;
        token_from_daily(&secret, ip, device)
    }

    /// All counter updates for one countable pageview on `day`.
    ///
    /// Without a visitor token the unique-visitor sketch is left alone.
    pub fn build_batch(
        &self,
        event: &PageviewEvent,
        day: &str,
        token: Option<&VisitorToken>,
    ) -> WriteBatch {
        let keys = &self.keys;
        let cap = Some(self.config.max_dimension_keys);
        let mut batch = WriteBatch::new();

        batch.incr(keys.pageviews(day), 1);
        if let Some(token) = token {
            batch.register_max(
                keys.visitors(day),
                observe_with_precision(token.as_bytes(), DEFAULT_PRECISION),
                DEFAULT_REGISTERS,
            );
        }

        let dimensions = [
            (Dimension::Path, Some(event.path.as_str())),
            (Dimension::Referrer, Some(event.referrer.as_str())),
            (Dimension::UtmSource, event.utm_source.as_deref()),
            (Dimension::UtmMedium, event.utm_medium.as_deref()),
            (Dimension::UtmCampaign, event.utm_campaign.as_deref()),
            (Dimension::Device, Some(event.device.as_str())),
            (Dimension::Lang, Some(event.lang.as_str())),
            (Dimension::Browser, Some(event.browser.as_str())),
            (Dimension::Os, Some(event.os.as_str())),
            (Dimension::Country, event.country.as_deref()),
        ];
        for (dim, value) in dimensions {
            if let Some(value) = value {
                batch.hash_incr(keys.dimension(dim, day), value, 1, cap);
            }
        }

        if let Some(duration) = event.duration_ms {
            let ms = duration as i64;
            batch
                .hash_incr(
                    keys.perf(PerfMetric::Histogram, day),
                    bucket_label(duration),
                    1,
                    None,
                )
                .incr(keys.perf(PerfMetric::SumMs, day), ms)
                .incr(keys.perf(PerfMetric::Count, day), 1)
                .hash_incr(keys.perf(PerfMetric::PathSumMs, day), &event.path, ms, cap)
                .hash_incr(keys.perf(PerfMetric::PathCount, day), &event.path, 1, cap);
        }

        batch
    }
}
