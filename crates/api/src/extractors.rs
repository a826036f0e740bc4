//! Request extractors.

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use engine_core::classify::TRUSTED_COUNTRY_HEADERS;
use engine_core::RequestContext;
use std::net::SocketAddr;

use crate::response::ApiError;
use crate::state::AppState;

/// Server-side render time reported by the edge.
pub const RENDER_DURATION_HEADER: &str = "x-render-duration-ms";

/// Client IP address.
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

fn header_ip(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// Resolves the client address behind `trusted_hops` reverse proxies.
///
/// Each proxy appends the address it saw to `X-Forwarded-For`, so the client
/// is the entry the outermost trusted proxy appended: `trusted_hops` from the
/// right. Entries further left are client-supplied and ignored. With no
/// trusted proxies only the socket peer counts.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trusted_hops: usize,
) -> Option<String> {
    let peer_ip = || peer.map(|addr| addr.ip().to_string());
    if trusted_hops == 0 {
        return peer_ip();
    }

    let hops: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .collect();

    if !hops.is_empty() {
        let index = hops.len().saturating_sub(trusted_hops);
        return Some(hops[index].to_string());
    }

    header_ip(headers, "x-real-ip").or_else(peer_ip)
}

#[async_trait]
impl FromRequestParts<AppState> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let hops = state.collector.config().trusted_proxy_hops;
        Ok(ClientIp(client_ip(&parts.headers, peer, hops)))
    }
}

/// Whether the request carries an admin session.
#[derive(Debug, Clone, Copy)]
pub struct AdminSession(pub bool);

#[async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(AdminSession(state.sessions.is_admin(&parts.headers).await))
    }
}

/// Rejects requests without an admin session.
#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin;

#[async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if state.sessions.is_admin(&parts.headers).await {
            Ok(RequireAdmin)
        } else {
            Err(ApiError::unauthorized("admin session required"))
        }
    }
}

fn header_string(headers: &HeaderMap, name: impl header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Collects the classification inputs of an ingest request.
///
/// The render duration is only read when `trust_proxy_headers` is set; the
/// edge proxy must overwrite that header on every request.
pub fn request_context(
    headers: &HeaderMap,
    client_ip: Option<String>,
    is_admin: bool,
    trust_proxy_headers: bool,
) -> RequestContext {
    RequestContext {
        user_agent: header_string(headers, header::USER_AGENT),
        accept_language: header_string(headers, header::ACCEPT_LANGUAGE),
        referer: header_string(headers, header::REFERER),
        country: TRUSTED_COUNTRY_HEADERS
            .iter()
            .find_map(|name| header_string(headers, *name)),
        client_ip,
        is_admin,
        duration_ms: header_string(headers, RENDER_DURATION_HEADER)
            .filter(|_| trust_proxy_headers)
            .and_then(|v| v.parse::<u64>().ok()),
    }
}
