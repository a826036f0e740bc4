//! Write batches.
//!
//! One pageview turns into one batch. Every op is commutative (add, hash add,
//! register max) so batches from concurrent requests may land in any order.

use chrono::Duration;
use engine_core::sketch::Observation;

/// A single store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// `counter[key] += by`
    Incr { key: String, by: i64 },
    /// `hash[key][field] += by`; new fields past `max_fields` fold into the
    /// overflow field.
    HashIncr {
        key: String,
        field: String,
        by: i64,
        max_fields: Option<usize>,
    },
    /// `sketch[key][index] = max(sketch[key][index], rank)` on a register
    /// array of `width` bytes.
    RegisterMax {
        key: String,
        index: usize,
        rank: u8,
        width: usize,
    },
    /// Sets the key's expiry to now + `ttl` unless it already has one.
    ExpireIfUnset { key: String, ttl: Duration },
}

impl Op {
    pub fn key(&self) -> &str {
        match self {
            Op::Incr { key, .. }
            | Op::HashIncr { key, .. }
            | Op::RegisterMax { key, .. }
            | Op::ExpireIfUnset { key, .. } => key,
        }
    }

    /// Whether the op changes a value (as opposed to key metadata).
    pub fn is_write(&self) -> bool {
        !matches!(self, Op::ExpireIfUnset { .. })
    }
}

/// Ordered list of ops applied as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<Op>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&mut self, key: impl Into<String>, by: i64) -> &mut Self {
        self.ops.push(Op::Incr {
            key: key.into(),
            by,
        });
        self
    }

    pub fn hash_incr(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        by: i64,
        max_fields: Option<usize>,
    ) -> &mut Self {
        self.ops.push(Op::HashIncr {
            key: key.into(),
            field: field.into(),
            by,
            max_fields,
        });
        self
    }

    pub fn register_max(&mut self, key: impl Into<String>, obs: Observation, width: usize) -> &mut Self {
        self.ops.push(Op::RegisterMax {
            key: key.into(),
            index: obs.index,
            rank: obs.rank,
            width,
        });
        self
    }

    pub fn expire_if_unset(&mut self, key: impl Into<String>, ttl: Duration) -> &mut Self {
        self.ops.push(Op::ExpireIfUnset {
            key: key.into(),
            ttl,
        });
        self
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<Op> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Distinct keys written by this batch, in first-seen order.
    pub fn written_keys(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.ops
            .iter()
            .filter(|op| op.is_write())
            .map(Op::key)
            .filter(|key| seen.insert(*key))
            .map(str::to_string)
            .collect()
    }
}
