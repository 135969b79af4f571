//! ClickHouse client wrapper.

use crate::config::ClickHouseConfig;
use clickhouse::Client;
use tracing::info;

/// ClickHouse client bound to the configured database.
#[derive(Clone)]
pub struct ClickHouseClient {
    inner: Client,
    config: ClickHouseConfig,
}

impl ClickHouseClient {
    pub fn new(config: ClickHouseConfig) -> Self {
        let mut client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database);

        if let Some(ref user) = config.username {
            client = client.with_user(user);
        }

        if let Some(ref pass) = config.password {
            client = client.with_password(pass);
        }

        info!(
            url = %config.url,
            database = %config.database,
            "Created ClickHouse client"
        );

        Self {
            inner: client,
            config,
        }
    }

    /// Returns the inner clickhouse client.
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    pub fn config(&self) -> &ClickHouseConfig {
        &self.config
    }

    /// Fully qualified table name.
    pub fn table(&self, name: &str) -> String {
        format!("{}.{}", self.config.database, name)
    }
}
