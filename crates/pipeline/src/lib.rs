//! Pageview pipeline: collection, aggregation and retention.

pub mod aggregator;
pub mod collector;
pub mod retention;

pub use aggregator::{
    clamp_limit, Aggregated, Aggregator, DayPoint, DimensionCount, PerfSummary, SlowPath, Summary,
};
pub use collector::{Accepted, Collector, Rejected, SkipReason};
pub use retention::RetentionManager;
