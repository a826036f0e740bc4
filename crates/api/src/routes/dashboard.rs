//! Dashboard read endpoints (admin only).
//!
//! Reads always answer 200; unreadable days come back as zeros with
//! `partial: true`.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use engine_core::{Dimension, RangeToken};
use pipeline::{clamp_limit, Aggregated, DayPoint, DimensionCount, PerfSummary, SlowPath, Summary};
use serde::Deserialize;

use crate::extractors::RequireAdmin;
use crate::response::{ApiError, DashboardResponse};
use crate::state::AppState;

/// Query parameters shared by dashboard reads.
#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub range: Option<String>,
    pub limit: Option<String>,
}

impl DashboardQuery {
    /// Unknown ranges fall back to the default.
    pub fn range(&self) -> RangeToken {
        self.range
            .as_deref()
            .and_then(|r| r.parse().ok())
            .unwrap_or_default()
    }

    pub fn limit(&self) -> usize {
        clamp_limit(self.limit.as_deref().and_then(|l| l.trim().parse().ok()))
    }
}

/// GET /analytics/summary
pub async fn summary_handler(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Query(query): Query<DashboardQuery>,
) -> Json<Aggregated<Summary>> {
    Json(state.aggregator.summary(query.range(), query.limit()).await)
}

/// GET /analytics/series
pub async fn series_handler(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Query(query): Query<DashboardQuery>,
) -> Json<DashboardResponse<Vec<DayPoint>>> {
    let range = query.range();
    let days = state.aggregator.days(range);
    Json(DashboardResponse {
        range,
        result: state.aggregator.daily_series(&days).await,
    })
}

/// GET /analytics/top/:dimension
pub async fn top_handler(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(dimension): Path<String>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardResponse<Vec<DimensionCount>>>, ApiError> {
    let dimension: Dimension = dimension.parse()?;
    let range = query.range();
    let days = state.aggregator.days(range);
    Ok(Json(DashboardResponse {
        range,
        result: state
            .aggregator
            .top_dimension(dimension, &days, query.limit())
            .await,
    }))
}

/// GET /analytics/perf
pub async fn perf_handler(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Query(query): Query<DashboardQuery>,
) -> Json<DashboardResponse<PerfSummary>> {
    let range = query.range();
    let days = state.aggregator.days(range);
    Json(DashboardResponse {
        range,
        result: state.aggregator.perf_summary(&days).await,
    })
}

/// GET /analytics/slow-paths
pub async fn slow_paths_handler(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Query(query): Query<DashboardQuery>,
) -> Json<DashboardResponse<Vec<SlowPath>>> {
    let range = query.range();
    let days = state.aggregator.days(range);
    Json(DashboardResponse {
        range,
        result: state.aggregator.slow_paths(&days, query.limit()).await,
    })
}
