//! Mock implementations for testing.

use async_trait::async_trait;
use counter_store::{CounterStore, KeyRead, MemoryStore, WriteBatch};
use engine_core::{Error, Result, SharedClock};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Memory store with switchable failures.
///
/// Implements the same `CounterStore` trait as the production stores, so
/// tests drive the real collector and aggregator through outages.
pub struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    /// Reads of keys ending in this day fail per key
    broken_day: Mutex<Option<String>>,
    writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            inner: MemoryStore::with_clock(clock),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            broken_day: Mutex::new(None),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn break_day(&self, day: Option<&str>) {
        *self.broken_day.lock() = day.map(str::to_string);
    }

    /// Batches applied successfully.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::store_unavailable("injected read failure"));
        }
        Ok(())
    }

    fn break_keys<T>(&self, keys: &[String], reads: Vec<KeyRead<T>>) -> Vec<KeyRead<T>> {
        let broken = self.broken_day.lock().clone();
        let Some(day) = broken else {
            return reads;
        };
        keys.iter()
            .zip(reads)
            .map(|(key, read)| {
                if key.ends_with(&day) {
                    Err(Error::store_unavailable("injected day failure"))
                } else {
                    read
                }
            })
            .collect()
    }
}

#[async_trait]
impl CounterStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky-memory"
    }

    async fn apply(&self, batch: WriteBatch) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::store_unavailable("injected write failure"));
        }
        self.inner.apply(batch).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read_counters(&self, keys: &[String]) -> Result<Vec<KeyRead<i64>>> {
        self.check_reads()?;
        Ok(self.break_keys(keys, self.inner.read_counters(keys).await?))
    }

    async fn read_hashes(&self, keys: &[String]) -> Result<Vec<KeyRead<HashMap<String, i64>>>> {
        self.check_reads()?;
        Ok(self.break_keys(keys, self.inner.read_hashes(keys).await?))
    }

    async fn read_sketches(&self, keys: &[String]) -> Result<Vec<KeyRead<Vec<u8>>>> {
        self.check_reads()?;
        Ok(self.break_keys(keys, self.inner.read_sketches(keys).await?))
    }

    async fn purge_expired(&self) -> Result<u64> {
        self.inner.purge_expired().await
    }

    async fn ping(&self) -> Result<()> {
        self.check_reads()
    }

    fn is_healthy(&self) -> bool {
        !self.fail_reads.load(Ordering::SeqCst) && !self.fail_writes.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::ManualClock;
    use std::sync::Arc;

    fn store() -> FlakyStore {
        FlakyStore::new(Arc::new(ManualClock::new(crate::fixtures::start_time())))
    }

    #[tokio::test]
    async fn test_flaky_store_failure_modes() {
        let store = store();
        let mut batch = WriteBatch::new();
        batch.incr("k:2024-05-14", 1).incr("k:2024-05-15", 2);
        store.apply(batch).await.unwrap();
        assert_eq!(store.write_count(), 1);

        store.set_fail_writes(true);
        assert!(store.apply(WriteBatch::new()).await.is_err());
        assert!(!store.is_healthy());
        store.set_fail_writes(false);

        store.break_day(Some("2024-05-14"));
        let keys = vec!["k:2024-05-14".to_string(), "k:2024-05-15".to_string()];
        let reads = store.read_counters(&keys).await.unwrap();
        assert!(reads[0].is_err());
        assert_eq!(reads[1].as_ref().unwrap(), &Some(2));

        store.set_fail_reads(true);
        assert!(store.read_counters(&keys).await.is_err());
        assert!(store.ping().await.is_err());
    }
}
