//! ClickHouse table schemas.
//!
//! Both tables are AggregatingMergeTree with `SimpleAggregateFunction`
//! columns: an insert is an increment (sum) or a register update (max), and
//! background merges fold rows for the same key together. Reads aggregate
//! again, so unmerged parts never change results. The earliest expiry of a
//! key wins (min), matching "TTL set at first write".
//!
//! Rows of one key can carry different expiries: a hash field first written
//! late in the day expires later than the key. Reads therefore filter on the
//! per-key minimum, and the table TTL only drops rows
//! [`EXPIRY_GRACE_DAYS`] after their own expiry, so a key's earliest row
//! outlives every other row of that key and expired keys never reappear in
//! part.

/// Physical deletion lag behind `expires_at`. Day keys are only written
/// during their own UTC day, so expiries within a key differ by under a day.
pub const EXPIRY_GRACE_DAYS: u32 = 2;

/// Counters and dimension hashes. Plain counters use the empty field.
pub fn create_counters_table(database: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {database}.counters (
    key String,
    field String,
    value SimpleAggregateFunction(sum, Int64),
    expires_at SimpleAggregateFunction(min, UInt32)
)
ENGINE = AggregatingMergeTree()
ORDER BY (key, field)
TTL toDateTime(expires_at) + INTERVAL {EXPIRY_GRACE_DAYS} DAY
SETTINGS index_granularity = 8192
"#
    )
}

/// Cardinality sketch registers, one row per touched register.
pub fn create_sketch_registers_table(database: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {database}.sketch_registers (
    key String,
    register UInt32,
    rank SimpleAggregateFunction(max, UInt8),
    width SimpleAggregateFunction(max, UInt32),
    expires_at SimpleAggregateFunction(min, UInt32)
)
ENGINE = AggregatingMergeTree()
ORDER BY (key, register)
TTL toDateTime(expires_at) + INTERVAL {EXPIRY_GRACE_DAYS} DAY
SETTINGS index_granularity = 8192
"#
    )
}

pub fn create_database(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {database}")
}

/// Table DDL in creation order.
pub fn all_tables(database: &str) -> Vec<String> {
    vec![
        create_counters_table(database),
        create_sketch_registers_table(database),
    ]
}

/// Table names.
pub mod tables {
    pub const COUNTERS: &str = "counters";
    pub const SKETCH_REGISTERS: &str = "sketch_registers";
}
