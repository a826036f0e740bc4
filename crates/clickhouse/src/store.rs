//! `CounterStore` on ClickHouse.
//!
//! Every op becomes an inserted row: increments are summed, register updates
//! are maxed and expiries are min'ed by the table engine and again at read
//! time. One batch is at most two inserts (counters, registers). Dimension
//! caps are not enforced here; values are already sanitized and bounded by
//! the classifier, and table TTL drops old days.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use counter_store::{CounterStore, KeyRead, Op, WriteBatch};
use engine_core::{Error, Result, SharedClock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Instant;
use telemetry::metrics;
use tracing::{debug, warn};

use crate::client::ClickHouseClient;
use crate::health::check_connection;
use crate::schema::tables;

/// Aggregating read over `table` restricted to live keys.
///
/// A key is live while the earliest expiry across all of its rows is in the
/// future, so every field of a key expires together. Binds: keys, keys, now.
fn live_keys_query(table: &str, columns: &str, group_by: &str) -> String {
    format!(
        "SELECT {columns} FROM {table} \
         WHERE has(?, key) AND key IN ( \
             SELECT key FROM {table} WHERE has(?, key) \
             GROUP BY key HAVING min(expires_at) > ? \
         ) \
         GROUP BY {group_by}"
    )
}

/// Expiry for rows of keys that never received one. Leaves headroom so the
/// table TTL grace cannot overflow `DateTime`.
const NO_EXPIRY: u32 = u32::MAX - 7 * 86_400;

#[derive(Debug, Clone, Row, Serialize)]
struct CounterRow {
    key: String,
    field: String,
    value: i64,
    expires_at: u32,
}

#[derive(Debug, Clone, Row, Serialize)]
struct RegisterRow {
    key: String,
    register: u32,
    rank: u8,
    width: u32,
    expires_at: u32,
}

#[derive(Debug, Row, Deserialize)]
struct CounterReadRow {
    key: String,
    field: String,
    value: i64,
}

#[derive(Debug, Row, Deserialize)]
struct RegisterReadRow {
    key: String,
    register: u32,
    rank: u8,
    width: u32,
}

fn epoch_seconds(at: DateTime<Utc>) -> u32 {
    at.timestamp().clamp(0, NO_EXPIRY as i64) as u32
}

/// Rows for one batch, grouped by table.
#[derive(Debug, Default)]
struct BatchRows {
    counters: Vec<CounterRow>,
    registers: Vec<RegisterRow>,
}

impl BatchRows {
    fn from_batch(batch: WriteBatch, now: DateTime<Utc>) -> Self {
        let expiries: HashMap<String, u32> = batch
            .ops()
            .iter()
            .filter_map(|op| match op {
                Op::ExpireIfUnset { key, ttl } => {
                    let at = now.checked_add_signed(*ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
                    Some((key.clone(), epoch_seconds(at)))
                }
                _ => None,
            })
            .collect();
        let expiry_of = |key: &str| expiries.get(key).copied().unwrap_or(NO_EXPIRY);

        let mut rows = Self::default();
        for op in batch.into_ops() {
            match op {
                Op::Incr { key, by } => rows.counters.push(CounterRow {
                    expires_at: expiry_of(&key),
                    key,
                    field: String::new(),
                    value: by,
                }),
                Op::HashIncr { key, field, by, .. } => rows.counters.push(CounterRow {
                    expires_at: expiry_of(&key),
                    key,
                    field,
                    value: by,
                }),
                Op::RegisterMax {
                    key,
                    index,
                    rank,
                    width,
                } => rows.registers.push(RegisterRow {
                    expires_at: expiry_of(&key),
                    key,
                    register: index as u32,
                    rank,
                    width: width as u32,
                }),
                Op::ExpireIfUnset { .. } => {}
            }
        }
        rows
    }
}

/// Counter store backed by ClickHouse.
pub struct ClickHouseStore {
    client: ClickHouseClient,
    clock: SharedClock,
}

impl ClickHouseStore {
    pub fn new(client: ClickHouseClient, clock: SharedClock) -> Self {
        Self { client, clock }
    }

    pub fn client(&self) -> &ClickHouseClient {
        &self.client
    }

    /// Runs `fut` under the configured query timeout.
    async fn timed<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, clickhouse::error::Error>>,
    {
        let start = Instant::now();
        let result = tokio::time::timeout(self.client.config().timeout(), fut).await;
        metrics()
            .store_latency_ms
            .observe(start.elapsed().as_millis() as u64);

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::store_unavailable(format!("{} failed: {}", what, e))),
            Err(_) => Err(Error::store_unavailable(format!("{} timed out", what))),
        }
    }

    async fn insert_rows<T>(&self, table: &str, rows: &[T]) -> Result<()>
    where
        T: Row + Serialize,
    {
        if rows.is_empty() {
            return Ok(());
        }
        self.timed("insert", async {
            let mut insert = self.client.inner().insert(table)?;
            for row in rows {
                insert.write(row).await?;
            }
            insert.end().await
        })
        .await
    }

    /// Empties both tables (test cleanup).
    pub async fn truncate(&self) -> Result<()> {
        for table in [tables::COUNTERS, tables::SKETCH_REGISTERS] {
            let sql = format!("TRUNCATE TABLE IF EXISTS {}", table);
            self.timed("truncate", self.client.inner().query(&sql).execute())
                .await?;
        }
        Ok(())
    }

    async fn fetch_counter_rows(&self, keys: &[String]) -> Result<Vec<CounterReadRow>> {
        let sql = live_keys_query(
            tables::COUNTERS,
            "key, field, sum(value) AS value",
            "key, field",
        );
        let now = epoch_seconds(self.clock.now());
        self.timed(
            "counter read",
            self.client
                .inner()
                .query(&sql)
                .bind(keys)
                .bind(keys)
                .bind(now)
                .fetch_all::<CounterReadRow>(),
        )
        .await
    }
}

/// Groups rows by key, keeping the order of `keys`.
fn group_by_key<R>(
    keys: &[String],
    rows: Vec<R>,
    key_of: impl Fn(&R) -> &str,
) -> Vec<Vec<R>> {
    let positions: HashMap<&str, usize> = keys
        .iter()
        .enumerate()
        .map(|(i, k)| (k.as_str(), i))
        .collect();
    let mut grouped: Vec<Vec<R>> = keys.iter().map(|_| Vec::new()).collect();

    for row in rows {
        if let Some(&i) = positions.get(key_of(&row)) {
            grouped[i].push(row);
        }
    }
    grouped
}

#[async_trait]
impl CounterStore for ClickHouseStore {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    async fn apply(&self, batch: WriteBatch) -> Result<()> {
        let rows = BatchRows::from_batch(batch, self.clock.now());
        debug!(
            counters = rows.counters.len(),
            registers = rows.registers.len(),
            "Writing batch"
        );

        let (counters, registers) = tokio::join!(
            self.insert_rows(tables::COUNTERS, &rows.counters),
            self.insert_rows(tables::SKETCH_REGISTERS, &rows.registers),
        );
        counters?;
        registers
    }

    async fn read_counters(&self, keys: &[String]) -> Result<Vec<KeyRead<i64>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.fetch_counter_rows(keys).await?;

        Ok(group_by_key(keys, rows, |r| r.key.as_str())
            .into_iter()
            .zip(keys)
            .map(|(rows, key)| {
                if rows.is_empty() {
                    Ok(None)
                } else if rows.iter().any(|r| !r.field.is_empty()) {
                    Err(Error::wrong_type(key.clone(), "counter", "hash"))
                } else {
                    Ok(Some(rows.iter().map(|r| r.value).sum::<i64>()))
                }
            })
            .collect())
    }

    async fn read_hashes(&self, keys: &[String]) -> Result<Vec<KeyRead<HashMap<String, i64>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.fetch_counter_rows(keys).await?;

        Ok(group_by_key(keys, rows, |r| r.key.as_str())
            .into_iter()
            .zip(keys)
            .map(|(rows, key)| {
                if rows.is_empty() {
                    Ok(None)
                } else if rows.iter().any(|r| r.field.is_empty()) {
                    Err(Error::wrong_type(key.clone(), "hash", "counter"))
                } else {
                    Ok(Some(rows.into_iter().map(|r| (r.field, r.value)).collect()))
                }
            })
            .collect())
    }

    async fn read_sketches(&self, keys: &[String]) -> Result<Vec<KeyRead<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let sql = live_keys_query(
            tables::SKETCH_REGISTERS,
            "key, register, max(rank) AS rank, max(width) AS width",
            "key, register",
        );
        let now = epoch_seconds(self.clock.now());
        let rows = self
            .timed(
                "sketch read",
                self.client
                    .inner()
                    .query(&sql)
                    .bind(keys)
                    .bind(keys)
                    .bind(now)
                    .fetch_all::<RegisterReadRow>(),
            )
            .await?;

        Ok(group_by_key(keys, rows, |r| r.key.as_str())
            .into_iter()
            .map(|rows| {
                let Some(width) = rows.iter().map(|r| r.width as usize).max() else {
                    return Ok(None);
                };
                let mut registers = vec![0u8; width];
                for row in rows {
                    if let Some(register) = registers.get_mut(row.register as usize) {
                        *register = (*register).max(row.rank);
                    }
                }
                Ok(Some(registers))
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        if check_connection(&self.client).await {
            Ok(())
        } else {
            warn!("ClickHouse ping failed");
            Err(Error::store_unavailable("ClickHouse ping failed"))
        }
    }
}
