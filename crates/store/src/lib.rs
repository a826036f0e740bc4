//! Counter store adapter for the analytics engine.
//!
//! The pipeline holds no counters of its own. Every write goes through
//! [`CounterStore::apply`] as one atomic batch, and every read is a batched
//! lookup over many keys of one kind.

pub mod batch;
pub mod memory;

pub use batch::{Op, WriteBatch};
pub use memory::MemoryStore;

use async_trait::async_trait;
use engine_core::Result;
use std::collections::HashMap;

/// Outcome of reading one key: missing keys are `Ok(None)`, a key holding
/// another kind of value is an error for that key only.
pub type KeyRead<T> = Result<Option<T>>;

/// Atomic counter storage with per-key TTL.
///
/// An `Err` from a read means the whole round trip failed; per-key problems
/// are reported in the matching [`KeyRead`]. Results are in key order.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Backend name for logs and health output.
    fn name(&self) -> &'static str;

    /// Applies every op in `batch` as one unit.
    async fn apply(&self, batch: WriteBatch) -> Result<()>;

    async fn read_counters(&self, keys: &[String]) -> Result<Vec<KeyRead<i64>>>;

    async fn read_hashes(&self, keys: &[String]) -> Result<Vec<KeyRead<HashMap<String, i64>>>>;

    /// Raw sketch register arrays.
    async fn read_sketches(&self, keys: &[String]) -> Result<Vec<KeyRead<Vec<u8>>>>;

    /// Drops expired keys. Stores with native expiry have nothing to do.
    async fn purge_expired(&self) -> Result<u64> {
        Ok(0)
    }

    /// Round trip to the backend.
    async fn ping(&self) -> Result<()>;

    /// Returns true if the store is healthy.
    fn is_healthy(&self) -> bool {
        true
    }
}
