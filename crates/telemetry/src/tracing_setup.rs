//! Tracing setup for structured logging.
//!
//! Log lines never carry client IPs, visitor tokens or secrets; callers log
//! classified values only.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Filter used when neither `RUST_LOG` nor a configured filter parses.
pub const DEFAULT_FILTER: &str = "info,hyper=warn,h2=warn,tower_http=info";

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// `LOG_JSON=1` or `LOG_JSON=true` selects JSON.
    pub fn from_flag(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "1" || v == "true" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Directive string, e.g. `info,pipeline=debug`
    pub filter: String,
    pub format: LogFormat,
    /// Emit span open/close events
    pub span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Pretty,
            span_events: false,
        }
    }
}

impl TracingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_span_events(mut self, span_events: bool) -> Self {
        self.span_events = span_events;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Installs the global subscriber.
pub fn init_tracing(config: TracingConfig) {
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    match config.format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_span_events(span_events)
                .with_current_span(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(config.env_filter())
                .with(fmt_layer)
                .init();
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .with_span_events(span_events)
                .with_target(true);

            tracing_subscriber::registry()
                .with(config.env_filter())
                .with(fmt_layer)
                .init();
        }
    }

    tracing::info!(filter = %config.filter, format = ?config.format, "Tracing initialized");
}

/// Initialize tracing from `LOG_JSON` and `RUST_LOG`.
pub fn init_tracing_from_env() {
    let format = LogFormat::from_flag(std::env::var("LOG_JSON").ok().as_deref());
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());

    init_tracing(TracingConfig::new().with_filter(filter).with_format(format));
}
