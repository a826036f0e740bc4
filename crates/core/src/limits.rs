//! Size and length limits for the analytics engine.
//!
//! Every value that becomes part of a store key or a hash field is capped
//! here, which bounds key size and the damage a hostile client can do.

// === Ingest Limits ===

/// Maximum ingest body size in bytes (4KB).
///
/// The body only carries a path and three UTM fields.
pub const MAX_INGEST_BODY_BYTES: usize = 4 * 1024;

/// User agent string max length considered for classification.
pub const MAX_USER_AGENT_LEN: usize = 512;

/// Accept-Language header max length considered for classification.
pub const MAX_ACCEPT_LANGUAGE_LEN: usize = 256;

/// Referer header max length considered for classification.
pub const MAX_REFERRER_LEN: usize = 2048;

// === Dimension Value Limits (chars) ===

/// Sanitized path max length.
pub const MAX_PATH_LEN: usize = 120;

/// Sanitized UTM field max length.
pub const MAX_UTM_LEN: usize = 80;

/// Sanitized referrer host max length (DNS names are at most 253).
pub const MAX_REFERRER_HOST_LEN: usize = 253;

// === Dimension Cardinality ===

/// Default cap on distinct fields per dimension hash per day.
pub const DEFAULT_MAX_DIMENSION_KEYS: usize = 5000;

/// Field that absorbs increments once a dimension hash is full.
pub const OVERFLOW_FIELD: &str = "(other)";

// === Retention ===

/// Default counter retention (400 days).
pub const DEFAULT_TTL_SECONDS: u64 = 400 * 24 * 60 * 60;

/// Smallest accepted retention (one day).
pub const MIN_TTL_SECONDS: u64 = 24 * 60 * 60;

// === Ranges ===

/// Hard cap on the number of days a read may span.
pub const MAX_RANGE_DAYS: usize = 365;

/// Default top-N size for dashboard reads.
pub const DEFAULT_TOP_LIMIT: usize = 10;

/// Largest top-N size a dashboard read may request.
pub const MAX_TOP_LIMIT: usize = 100;

// === Performance ===

/// Durations above this are treated as measurement errors (10 minutes).
pub const MAX_DURATION_MS: u64 = 10 * 60 * 1000;
