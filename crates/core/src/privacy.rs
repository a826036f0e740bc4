//! Privacy token derivation.
//!
//! The client IP never leaves the request: it is folded into a per-day HMAC
//! token that is only ever fed to the visitor sketch. The pepper rotates daily,
//! so tokens from different days cannot be linked, and none of them can be
//! reversed without the master secret.
//!
//! ```text
//! daily_secret = HMAC-SHA256(master_secret, day)
//! unique_token = HMAC-SHA256(daily_secret, ip + "|" + device_class)
//! ```

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Length of secrets and tokens in bytes.
pub const TOKEN_LEN: usize = 32;

/// Per-day pepper derived from the master secret.
#[derive(Clone, PartialEq, Eq)]
pub struct DailySecret([u8; TOKEN_LEN]);

impl DailySecret {
    pub fn as_bytes(&self) -> &[u8; TOKEN_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for DailySecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DailySecret(..)")
    }
}

/// Visitor token; input to the sketch only.
#[derive(Clone, PartialEq, Eq)]
pub struct VisitorToken([u8; TOKEN_LEN]);

impl VisitorToken {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for VisitorToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VisitorToken(..)")
    }
}

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; TOKEN_LEN] {
    // HMAC accepts keys of any length
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).unwrap_or_else(|_| unreachable!());
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// `HMAC-SHA256(master_secret, day)`.
pub fn daily_secret(master_secret: &[u8], day: &str) -> DailySecret {
    DailySecret(hmac_sha256(master_secret, &[day.as_bytes()]))
}

/// Token for an `(ip, device_class)` pair under an already derived daily secret.
pub fn token_from_daily(secret: &DailySecret, ip: &str, device_class: &str) -> VisitorToken {
    VisitorToken(hmac_sha256(
        secret.as_bytes(),
        &[ip.as_bytes(), b"|", device_class.as_bytes()],
    ))
}

/// `HMAC-SHA256(daily_secret(master_secret, day), ip + "|" + device_class)`.
pub fn unique_token(master_secret: &[u8], day: &str, ip: &str, device_class: &str) -> VisitorToken {
    token_from_daily(&daily_secret(master_secret, day), ip, device_class)
}
