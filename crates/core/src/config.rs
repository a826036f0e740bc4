//! Analytics configuration.
//!
//! Built once at process start and shared behind an `Arc`. Nothing here is
//! read from the environment directly; the binary does the loading.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::daykey::DayKeys;
use crate::error::{Error, Result};
use crate::limits::{DEFAULT_MAX_DIMENSION_KEYS, DEFAULT_TTL_SECONDS, MIN_TTL_SECONDS};
use crate::retention::RetentionPolicy;

fn default_ttl_seconds() -> u64 {
    DEFAULT_TTL_SECONDS
}

fn default_store_timeout_ms() -> u64 {
    250
}

fn default_max_dimension_keys() -> usize {
    DEFAULT_MAX_DIMENSION_KEYS
}

fn default_trusted_proxy_hops() -> usize {
    1
}

fn default_excluded_path_prefixes() -> Vec<String> {
    vec!["/admin".to_string(), "/api".to_string()]
}

/// Key prefixes are embedded verbatim in every store key.
fn validate_prefix(prefix: &str) -> std::result::Result<(), ValidationError> {
    let ok = prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-'));
    if ok {
        Ok(())
    } else {
        let mut err = ValidationError::new("invalid_prefix");
        err.message = Some("namespace_prefix may only contain [A-Za-z0-9:_-]".into());
        Err(err)
    }
}

fn validate_excluded_prefixes(prefixes: &[String]) -> std::result::Result<(), ValidationError> {
    if prefixes.iter().all(|p| p.starts_with('/')) {
        Ok(())
    } else {
        let mut err = ValidationError::new("invalid_excluded_prefix");
        err.message = Some("excluded path prefixes must start with '/'".into());
        Err(err)
    }
}

/// Analytics pipeline configuration.
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct AnalyticsConfig {
    /// HMAC key for the daily pepper
    #[validate(length(min = 16))]
    pub master_secret: String,

    /// Prepended to every store key
    #[validate(length(min = 1, max = 64), custom(function = "validate_prefix"))]
    pub namespace_prefix: String,

    /// Counter retention after first write
    #[serde(default = "default_ttl_seconds")]
    #[validate(range(min = 86400))]
    pub ttl_seconds: u64,

    /// Budget for the ingest store write
    #[serde(default = "default_store_timeout_ms")]
    #[validate(range(min = 1, max = 10000))]
    pub store_timeout_ms: u64,

    /// Distinct fields per dimension hash per day before folding into `(other)`
    #[serde(default = "default_max_dimension_keys")]
    #[validate(range(min = 1))]
    pub max_dimension_keys: usize,

    #[serde(default = "default_excluded_path_prefixes")]
    #[validate(custom(function = "validate_excluded_prefixes"))]
    pub excluded_path_prefixes: Vec<String>,

    /// Reject events whose path is invalid instead of counting them as `/`
    #[serde(default)]
    pub reject_invalid_paths: bool,

    /// Own host; referrers matching it are recorded as `internal`
    #[serde(default)]
    pub site_host: Option<String>,

    /// Reverse proxies in front of the service that append to
    /// `X-Forwarded-For` and overwrite `X-Real-IP` / `X-Render-Duration-Ms`.
    /// Zero trusts no forwarding header at all.
    #[serde(default = "default_trusted_proxy_hops")]
    #[validate(range(max = 16))]
    pub trusted_proxy_hops: usize,
}

impl std::fmt::Debug for AnalyticsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsConfig")
            .field("master_secret", &"<redacted>")
            .field("namespace_prefix", &self.namespace_prefix)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("store_timeout_ms", &self.store_timeout_ms)
            .field("max_dimension_keys", &self.max_dimension_keys)
            .field("excluded_path_prefixes", &self.excluded_path_prefixes)
            .field("reject_invalid_paths", &self.reject_invalid_paths)
            .field("site_host", &self.site_host)
            .field("trusted_proxy_hops", &self.trusted_proxy_hops)
            .finish()
    }
}

impl AnalyticsConfig {
    /// Config with the required values set and defaults elsewhere.
    pub fn new(master_secret: impl Into<String>, namespace_prefix: impl Into<String>) -> Self {
        Self {
            master_secret: master_secret.into(),
            namespace_prefix: namespace_prefix.into(),
            ttl_seconds: default_ttl_seconds(),
            store_timeout_ms: default_store_timeout_ms(),
            max_dimension_keys: default_max_dimension_keys(),
            excluded_path_prefixes: default_excluded_path_prefixes(),
            reject_invalid_paths: false,
            site_host: None,
            trusted_proxy_hops: default_trusted_proxy_hops(),
        }
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn with_max_dimension_keys(mut self, max: usize) -> Self {
        self.max_dimension_keys = max;
        self
    }

    pub fn with_reject_invalid_paths(mut self, reject: bool) -> Self {
        self.reject_invalid_paths = reject;
        self
    }

    pub fn with_site_host(mut self, host: impl Into<String>) -> Self {
        self.site_host = Some(host.into());
        self
    }

    pub fn with_trusted_proxy_hops(mut self, hops: usize) -> Self {
        self.trusted_proxy_hops = hops;
        self
    }

    /// Checks every field; failures are fatal configuration errors.
    pub fn check(&self) -> Result<()> {
        if self.master_secret.trim().is_empty() {
            return Err(Error::configuration("master_secret is required"));
        }
        if self.namespace_prefix.is_empty() {
            return Err(Error::configuration("namespace_prefix is required"));
        }
        self.validate()
            .map_err(|e| Error::configuration(format!("invalid analytics config: {}", e)))?;
        if self.ttl_seconds < MIN_TTL_SECONDS {
            return Err(Error::configuration("ttl_seconds must be at least one day"));
        }
        Ok(())
    }

    pub fn keys(&self) -> DayKeys {
        DayKeys::new(self.namespace_prefix.clone())
    }

    pub fn retention(&self) -> Result<RetentionPolicy> {
        RetentionPolicy::new(self.ttl_seconds)
    }

    pub fn store_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.store_timeout_ms)
    }
}
