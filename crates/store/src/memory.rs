//! In-process counter store.
//!
//! A single mutex guards the key space, so a whole batch is applied
//! atomically with respect to other batches and reads. Expiry is evaluated
//! against the injected clock on every access; [`MemoryStore::purge_expired`]
//! reclaims memory for keys nobody touches again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_core::limits::OVERFLOW_FIELD;
use engine_core::{Error, Result, SharedClock, SystemClock};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::batch::{Op, WriteBatch};
use crate::{CounterStore, KeyRead};

const COUNTER: &str = "counter";
const HASH: &str = "hash";
const SKETCH: &str = "sketch";

#[derive(Debug, Clone)]
enum Value {
    Counter(i64),
    Hash(HashMap<String, i64>),
    Sketch(Vec<u8>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Counter(_) => COUNTER,
            Value::Hash(_) => HASH,
            Value::Sketch(_) => SKETCH,
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// Counter store held in memory.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: SharedClock,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .lock()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expiry of a live key, if it has one.
    pub fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        self.entries
            .lock()
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.expires_at)
    }

    /// Removes `key` if it has expired, so later lookups see it as absent.
    fn evict_if_expired(entries: &mut HashMap<String, Entry>, key: &str, now: DateTime<Utc>) {
        if entries.get(key).map(|e| e.is_expired(now)).unwrap_or(false) {
            entries.remove(key);
        }
    }

    /// Rejects the batch up front if any op targets a key of another kind,
    /// so a failing batch leaves no partial writes behind.
    fn check_types(entries: &HashMap<String, Entry>, ops: &[Op]) -> Result<()> {
        let mut planned: HashMap<&str, (&'static str, Option<usize>)> = HashMap::new();

        for op in ops {
            let (expected, width) = match op {
                Op::Incr { .. } => (COUNTER, None),
                Op::HashIncr { .. } => (HASH, None),
                Op::RegisterMax { width, .. } => (SKETCH, Some(*width)),
                Op::ExpireIfUnset { .. } => continue,
            };
            let key = op.key();

            let existing = match entries.get(key) {
                Some(Entry {
                    value: Value::Sketch(registers),
                    ..
                }) => Some((SKETCH, Some(registers.len()))),
                Some(entry) => Some((entry.value.kind(), None)),
                None => planned.get(key).copied(),
            };

            match existing {
                Some((found, _)) if found != expected => {
                    return Err(Error::wrong_type(key, expected, found));
                }
                Some((_, Some(have))) if width.is_some_and(|w| w != have) => {
                    return Err(Error::wrong_type(key, "sketch of matching size", SKETCH));
                }
                Some(_) => {}
                None => {
                    planned.insert(key, (expected, width));
                }
            }
        }
        Ok(())
    }

    fn apply_op(entries: &mut HashMap<String, Entry>, op: Op, now: DateTime<Utc>) {
        match op {
            Op::Incr { key, by } => {
                let entry = entries.entry(key).or_insert_with(|| Entry {
                    value: Value::Counter(0),
                    expires_at: None,
                });
                if let Value::Counter(n) = &mut entry.value {
                    *n = n.saturating_add(by);
                }
            }
            Op::HashIncr {
                key,
                field,
                by,
                max_fields,
            } => {
                let entry = entries.entry(key).or_insert_with(|| Entry {
                    value: Value::Hash(HashMap::new()),
                    expires_at: None,
                });
                if let Value::Hash(fields) = &mut entry.value {
                    let full = max_fields
                        .map(|max| fields.len() >= max)
                        .unwrap_or(false);
                    let field = if full && !fields.contains_key(&field) {
                        OVERFLOW_FIELD.to_string()
                    } else {
                        field
                    };
                    let n = fields.entry(field).or_insert(0);
                    *n = n.saturating_add(by);
                }
            }
            Op::RegisterMax {
                key,
                index,
                rank,
                width,
            } => {
                let entry = entries.entry(key).or_insert_with(|| Entry {
                    value: Value::Sketch(vec![0; width]),
                    expires_at: None,
                });
                if let Value::Sketch(registers) = &mut entry.value {
                    if let Some(register) = registers.get_mut(index) {
                        *register = (*register).max(rank);
                    }
                }
            }
            Op::ExpireIfUnset { key, ttl } => {
                if let Some(entry) = entries.get_mut(&key) {
                    if entry.expires_at.is_none() {
                        entry.expires_at =
                            Some(now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC));
                    }
                }
            }
        }
    }

    fn read<T>(&self, keys: &[String], extract: impl Fn(&str, &Value) -> KeyRead<T>) -> Vec<KeyRead<T>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        keys.iter()
            .map(|key| {
                Self::evict_if_expired(&mut entries, key, now);
                match entries.get(key.as_str()) {
                    Some(entry) => extract(key.as_str(), &entry.value),
                    None => Ok(None),
                }
            })
            .collect()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn apply(&self, batch: WriteBatch) -> Result<()> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        for op in batch.ops() {
            Self::evict_if_expired(&mut entries, op.key(), now);
        }
        Self::check_types(&entries, batch.ops())?;

        for op in batch.into_ops() {
            Self::apply_op(&mut entries, op, now);
        }
        Ok(())
    }

    async fn read_counters(&self, keys: &[String]) -> Result<Vec<KeyRead<i64>>> {
        Ok(self.read(keys, |key, value| match value {
            Value::Counter(n) => Ok(Some(*n)),
            other => Err(Error::wrong_type(key, COUNTER, other.kind())),
        }))
    }

    async fn read_hashes(&self, keys: &[String]) -> Result<Vec<KeyRead<HashMap<String, i64>>>> {
        Ok(self.read(keys, |key, value| match value {
            Value::Hash(fields) => Ok(Some(fields.clone())),
            other => Err(Error::wrong_type(key, HASH, other.kind())),
        }))
    }

    async fn read_sketches(&self, keys: &[String]) -> Result<Vec<KeyRead<Vec<u8>>>> {
        Ok(self.read(keys, |key, value| match value {
            Value::Sketch(registers) => Ok(Some(registers.clone())),
            other => Err(Error::wrong_type(key, SKETCH, other.kind())),
        }))
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = (before - entries.len()) as u64;

        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Purged expired keys");
        }
        Ok(removed)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
