//! Pageview ingest endpoint.
//!
//! The page fires this and forgets it, so the endpoint never answers with a
//! 5xx: store trouble becomes `200 {accepted:false}`.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::debug;

use crate::extractors::{request_context, AdminSession, ClientIp};
use crate::response::CollectResponse;
use crate::state::AppState;

/// POST /analytics/collect
pub async fn collect_handler(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    AdminSession(is_admin): AdminSession,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> (StatusCode, Json<CollectResponse>) {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(reason = %rejection, "Unreadable ingest body");
            telemetry::metrics().events_rejected.inc();
            return (
                StatusCode::BAD_REQUEST,
                Json(CollectResponse { accepted: false }),
            );
        }
    };

    let trust_proxy_headers = state.collector.config().trusted_proxy_hops > 0;
    let ctx = request_context(&headers, client_ip, is_admin, trust_proxy_headers);
    match state.collector.ingest(&body, ctx).await {
        Ok(outcome) if outcome.is_accepted() => {
            (StatusCode::CREATED, Json(CollectResponse { accepted: true }))
        }
        Ok(_) => (StatusCode::OK, Json(CollectResponse { accepted: false })),
        Err(_) => (
            StatusCode::BAD_REQUEST,
            Json(CollectResponse { accepted: false }),
        ),
    }
}
