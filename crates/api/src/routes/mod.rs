//! API routes.

pub mod collect;
pub mod dashboard;
pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use engine_core::limits::MAX_INGEST_BODY_BYTES;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let collect = Router::new()
        .route("/analytics/collect", post(collect::collect_handler))
        .layer(DefaultBodyLimit::max(MAX_INGEST_BODY_BYTES));

    Router::new()
        .merge(collect)
        .route("/analytics/summary", get(dashboard::summary_handler))
        .route("/analytics/series", get(dashboard::series_handler))
        .route("/analytics/top/:dimension", get(dashboard::top_handler))
        .route("/analytics/perf", get(dashboard::perf_handler))
        .route("/analytics/slow-paths", get(dashboard::slow_paths_handler))
        .route("/health", get(health::health_handler))
        .route("/health/ready", get(health::ready_handler))
        .route("/health/live", get(health::live_handler))
        .route("/metrics", get(health::metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}
