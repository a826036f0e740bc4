//! ClickHouse health checks and schema bootstrap.

use crate::client::ClickHouseClient;
use crate::schema::{all_tables, create_database};
use engine_core::{Error, Result};
use tracing::{debug, error};

/// Check ClickHouse connection health.
pub async fn check_connection(client: &ClickHouseClient) -> bool {
    match client.inner().query("SELECT 1").fetch_one::<u8>().await {
        Ok(_) => {
            debug!("ClickHouse connection healthy");
            true
        }
        Err(e) => {
            error!(error = %e, "ClickHouse health check failed");
            false
        }
    }
}

/// Creates the database and counter tables if missing.
pub async fn init_schema(client: &ClickHouseClient) -> Result<()> {
    let database = &client.config().database;

    client
        .server()
        .query(&create_database(database))
        .execute()
        .await
        .map_err(|e| Error::store_unavailable(format!("Failed to create database: {}", e)))?;

    for ddl in all_tables(database) {
        client
            .inner()
            .query(&ddl)
            .execute()
            .await
            .map_err(|e| Error::store_unavailable(format!("Failed to execute DDL: {}", e)))?;
    }

    debug!(database = %database, "ClickHouse schema initialized");
    Ok(())
}
