//! Unified error types for the analytics engine.
//!
//! Error codes:
//! - CONFIG_001: Missing or invalid configuration
//! - VALID_001-002: Ingest input errors
//! - STORE_001-002: Counter store errors
//! - AGG_001: Partial aggregation

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorCode {
    /// CONFIG_001: Master secret, namespace prefix or TTL missing/invalid
    Invalid,
}

impl ConfigErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Invalid => "CONFIG_001",
        }
    }
}

/// Validation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorCode {
    /// VALID_001: Unparseable body / invalid field
    MalformedInput,
    /// VALID_002: Body exceeds the ingest size limit
    PayloadTooLarge,
}

impl ValidationErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedInput => "VALID_001",
            Self::PayloadTooLarge => "VALID_002",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        400
    }
}

/// Counter store error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// STORE_001: Store unreachable or timed out
    Unavailable,
    /// STORE_002: Key holds a different kind of value
    WrongType,
}

impl StoreErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable => "STORE_001",
            Self::WrongType => "STORE_002",
        }
    }
}

/// Unified error type for the analytics engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Fatal configuration error, raised at startup.
    #[error("[{code}] {message}")]
    Configuration { code: &'static str, message: String },

    /// Malformed ingest input.
    #[error("[{code}] {message}")]
    MalformedInput {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    /// Transient counter store failure.
    #[error("[{code}] {message}")]
    StoreUnavailable { code: &'static str, message: String },

    /// A key holds a value of another kind.
    #[error("[{code}] key {key} holds a {found}, expected a {expected}")]
    StoreWrongType {
        code: &'static str,
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// One or more days of a range failed to read.
    #[error("[AGG_001] {failed} of {requested} day(s) failed to read")]
    PartialAggregation { failed: usize, requested: usize },

    #[error("sketch error: {0}")]
    Sketch(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            code: ConfigErrorCode::Invalid.code(),
            message: msg.into(),
        }
    }

    /// Create a validation error with code.
    pub fn validation_code(code: ValidationErrorCode, msg: impl Into<String>) -> Self {
        Self::MalformedInput {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    /// Create a malformed-input error (VALID_001).
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::validation_code(ValidationErrorCode::MalformedInput, msg)
    }

    /// Create a store-unavailable error.
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            code: StoreErrorCode::Unavailable.code(),
            message: msg.into(),
        }
    }

    /// Create a wrong-type error for `key`.
    pub fn wrong_type(key: impl Into<String>, expected: &'static str, found: &'static str) -> Self {
        Self::StoreWrongType {
            code: StoreErrorCode::WrongType.code(),
            key: key.into(),
            expected,
            found,
        }
    }

    pub fn sketch(msg: impl Into<String>) -> Self {
        Self::Sketch(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::MalformedInput { http_status, .. } => *http_status,
            Self::Serialization(_) => 400,
            Self::StoreUnavailable { .. } => 503,
            _ => 500,
        }
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Configuration { code, .. } => Some(code),
            Self::MalformedInput { code, .. } => Some(code),
            Self::StoreUnavailable { code, .. } => Some(code),
            Self::StoreWrongType { code, .. } => Some(code),
            Self::PartialAggregation { .. } => Some("AGG_001"),
            _ => None,
        }
    }

    /// Whether this error comes from the counter store.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. } | Self::StoreWrongType { .. }
        )
    }
}
