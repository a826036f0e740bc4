//! Admin session resolution.
//!
//! Authentication lives outside this service. All the engine needs is a
//! yes/no answer for "is this request an admin session", both to keep
//! admin traffic out of the counters and to gate dashboard reads.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};

/// Cookie carrying the admin session token.
pub const ADMIN_COOKIE: &str = "admin_session";

/// Resolves the admin flag for a request.
#[async_trait]
pub trait AdminSessions: Send + Sync {
    async fn is_admin(&self, headers: &HeaderMap) -> bool;
}

/// Compares a bearer token or `admin_session` cookie with a configured token.
///
/// Only the SHA-256 digest of the configured token is kept.
pub struct HeaderTokenSessions {
    digest: Option<[u8; 32]>,
}

impl HeaderTokenSessions {
    /// `None` or an empty token disables admin sessions entirely.
    pub fn new(token: Option<&str>) -> Self {
        Self {
            digest: token
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(digest),
        }
    }

    pub fn disabled() -> Self {
        Self { digest: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.digest.is_some()
    }
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

/// Token presented by the request, bearer header first.
pub fn presented_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == ADMIN_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl AdminSessions for HeaderTokenSessions {
    async fn is_admin(&self, headers: &HeaderMap) -> bool {
        match (&self.digest, presented_token(headers)) {
            (Some(expected), Some(token)) => digest(&token) == *expected,
            _ => false,
        }
    }
}
