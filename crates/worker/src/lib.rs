//! Background workers for the analytics engine.
//!
//! - Retention sweeper (reclaims expired keys in stores without native TTL)
//! - Store probe (keeps the `store` health component current)

pub mod probe;
pub mod retention;
pub mod scheduler;

pub use probe::StoreProbe;
pub use retention::RetentionSweeper;
pub use scheduler::*;
