//! Core types, key scheme, sketch and classification for the analytics engine.

pub mod classify;
pub mod clock;
pub mod config;
pub mod daykey;
pub mod error;
pub mod event;
pub mod histogram;
pub mod limits;
pub mod privacy;
pub mod retention;
pub mod sketch;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::AnalyticsConfig;
pub use daykey::{day_string, list_days, DayKeys, Dimension, PerfMetric, RangeToken};
pub use error::{Error, Result};
pub use event::{IngestBody, PageviewEvent, RequestContext, UtmParams};
pub use retention::RetentionPolicy;
pub use sketch::CardinalitySketch;
