//! Cookieless pageview analytics engine.
//!
//! - Pageview collection with daily-rotating, non-reversible visitor tokens
//! - Day-keyed counters, dimension hashes and HyperLogLog visitor sketches
//! - Dashboard aggregation with histogram percentiles
//! - Memory or ClickHouse counter store with TTL retention

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tracing::{error, info, warn};

use api::{router, AppState, HeaderTokenSessions};
use clickhouse_client::{ClickHouseClient, ClickHouseConfig, ClickHouseStore};
use counter_store::{CounterStore, MemoryStore};
use engine_core::{AnalyticsConfig, SharedClock, SystemClock};
use pipeline::{Aggregator, Collector};
use telemetry::{health, init_tracing_from_env};
use worker::{WorkerConfig, WorkerScheduler};

/// Counter store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StoreKind {
    Memory,
    Clickhouse,
}

impl std::str::FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "clickhouse" => Ok(Self::Clickhouse),
            other => anyhow::bail!("unknown store backend: {}", other),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    #[serde(default = "default_store")]
    store: StoreKind,

    /// Token that marks a request as an admin session
    #[serde(default)]
    admin_token: Option<String>,

    #[serde(default = "default_analytics")]
    analytics: AnalyticsConfig,

    #[serde(default)]
    clickhouse: ClickHouseConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_store() -> StoreKind {
    StoreKind::Memory
}

/// Required values are left empty and fail validation unless configured.
fn default_analytics() -> AnalyticsConfig {
    AnalyticsConfig::new("", "analytics:")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            store: default_store(),
            admin_token: None,
            analytics: default_analytics(),
            clickhouse: ClickHouseConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting analytics engine v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    config
        .analytics
        .check()
        .context("Invalid analytics configuration")?;
    info!(
        store = ?config.store,
        prefix = %config.analytics.namespace_prefix,
        ttl_seconds = config.analytics.ttl_seconds,
        "Loaded configuration"
    );

    let clock: SharedClock = Arc::new(SystemClock);
    let store = build_store(&config, clock.clone()).await?;
    check_health(store.as_ref()).await;

    let analytics = Arc::new(config.analytics.clone());
    let collector = Arc::new(
        Collector::new(analytics.clone(), store.clone(), clock.clone())
            .context("Failed to create collector")?,
    );
    let aggregator = Arc::new(
        Aggregator::new(analytics, store.clone(), clock)
            .context("Failed to create aggregator")?,
    );

    let sessions = HeaderTokenSessions::new(config.admin_token.as_deref());
    if !sessions.is_enabled() {
        warn!("No admin token configured, dashboard reads are disabled");
    }

    // Start background workers
    let worker_scheduler = Arc::new(WorkerScheduler::new(WorkerConfig::default(), store.clone()));
    let worker_handles = worker_scheduler.start();

    let state = AppState::new(collector, aggregator, store, Arc::new(sessions));
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // Socket peer is the client IP fallback when no proxy header is present
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Shutting down...");
    for handle in worker_handles {
        handle.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("ANALYTICS")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Flat overrides; nested env parsing is unreliable with underscored field names
    if let Ok(secret) = std::env::var("ANALYTICS_MASTER_SECRET") {
        config.analytics.master_secret = secret;
    }
    if let Ok(prefix) = std::env::var("ANALYTICS_PREFIX") {
        config.analytics.namespace_prefix = prefix;
    }
    if let Ok(ttl) = std::env::var("ANALYTICS_TTL_SECONDS") {
        config.analytics.ttl_seconds = ttl
            .trim()
            .parse()
            .context("ANALYTICS_TTL_SECONDS must be a number of seconds")?;
    }
    if let Ok(host) = std::env::var("ANALYTICS_SITE_HOST") {
        config.analytics.site_host = Some(host);
    }
    if let Ok(hops) = std::env::var("ANALYTICS_TRUSTED_PROXY_HOPS") {
        config.analytics.trusted_proxy_hops = hops
            .trim()
            .parse()
            .context("ANALYTICS_TRUSTED_PROXY_HOPS must be a number")?;
    }
    if let Ok(store) = std::env::var("ANALYTICS_STORE") {
        config.store = store.parse()?;
    }
    if let Ok(token) = std::env::var("ANALYTICS_ADMIN_TOKEN") {
        config.admin_token = Some(token);
    }

    if let Ok(url) = std::env::var("ANALYTICS_CLICKHOUSE_URL") {
        config.clickhouse.url = url;
    }
    if let Ok(database) = std::env::var("ANALYTICS_CLICKHOUSE_DATABASE") {
        config.clickhouse.database = database;
    }
    if let Ok(username) = std::env::var("ANALYTICS_CLICKHOUSE_USERNAME") {
        config.clickhouse.username = Some(username);
    }
    if let Ok(password) = std::env::var("ANALYTICS_CLICKHOUSE_PASSWORD") {
        config.clickhouse.password = Some(password);
    }

    Ok(config)
}

async fn build_store(config: &Config, clock: SharedClock) -> Result<Arc<dyn CounterStore>> {
    match config.store {
        StoreKind::Memory => {
            warn!("Using in-memory counter store, counters are lost on restart");
            Ok(Arc::new(MemoryStore::with_clock(clock)))
        }
        StoreKind::Clickhouse => {
            let client = ClickHouseClient::new(config.clickhouse.clone());
            if let Err(e) = clickhouse_client::init_schema(&client).await {
                // Tables may already exist; the probe reports connectivity
                error!("Failed to initialize ClickHouse schema: {}", e);
            }
            Ok(Arc::new(ClickHouseStore::new(client, clock)))
        }
    }
}

/// Check store health on startup.
async fn check_health(store: &dyn CounterStore) {
    match store.ping().await {
        Ok(()) => {
            health().store.set_healthy();
            info!(store = store.name(), "Counter store: healthy");
        }
        Err(e) => {
            health().store.set_unhealthy(e.to_string());
            error!(store = store.name(), error = %e, "Counter store: unhealthy");
        }
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
