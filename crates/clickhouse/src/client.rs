//! ClickHouse client wrapper.

use crate::config::ClickHouseConfig;
use clickhouse::Client;
use tracing::info;

/// ClickHouse client bound to the counter database.
#[derive(Clone)]
pub struct ClickHouseClient {
    inner: Client,
    config: ClickHouseConfig,
}

impl ClickHouseClient {
    /// Creates a new ClickHouse client.
    pub fn new(config: ClickHouseConfig) -> Self {
        let inner = Self::base_client(&config).with_database(&config.database);

        info!(
            url = %config.url,
            database = %config.database,
            "Created ClickHouse client"
        );

        Self { inner, config }
    }

    fn base_client(config: &ClickHouseConfig) -> Client {
        let mut client = Client::default().with_url(&config.url);

        if let Some(ref user) = config.username {
            client = client.with_user(user);
        }
        if let Some(ref pass) = config.password {
            client = client.with_password(pass);
        }
        client
    }

    /// Returns the inner clickhouse client.
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// Client not bound to a database, for `CREATE DATABASE`.
    pub fn server(&self) -> Client {
        Self::base_client(&self.config)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClickHouseConfig {
        &self.config
    }
}
