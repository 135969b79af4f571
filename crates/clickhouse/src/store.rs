//! Durable store trait and its ClickHouse implementation.

use async_trait::async_trait;
use tracing::info;
use tracking_core::{Day, Month, Result};

use crate::client::ClickHouseClient;
use crate::config::ClickHouseConfig;
use crate::{insert, query, schema};

/// Persistence for compiled days and months.
///
/// Upserts are idempotent: writing the same `(domain, day)` or
/// `(domain, month)` again replaces the earlier record.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn upsert_day(&self, day: &Day) -> Result<()>;

    async fn upsert_month(&self, month: &Month) -> Result<()>;

    /// Days of one domain within `from..=to` (`YYYYMMDD`), oldest first.
    async fn days_in_range(&self, domain: &str, from: &str, to: &str) -> Result<Vec<Day>>;

    /// Distinct domains with days within `from..=to`, sorted.
    async fn domains_with_days(&self, from: &str, to: &str) -> Result<Vec<String>>;

    /// Each domain with days before `cutoff`, paired with its oldest day.
    async fn domains_with_days_before(&self, cutoff: &str) -> Result<Vec<(String, String)>>;

    /// Months of one domain within `from..=to` (`YYYYMM`), oldest first.
    async fn months_in_range(&self, domain: &str, from: &str, to: &str) -> Result<Vec<Month>>;

    /// Deletes days within `from..until` and returns the number removed.
    async fn delete_days(&self, domain: &str, from: &str, until: &str) -> Result<u64>;

    async fn ping(&self) -> Result<()>;
}

/// [`DurableStore`] over ClickHouse.
#[derive(Clone)]
pub struct ClickHouseStore {
    client: ClickHouseClient,
}

impl ClickHouseStore {
    pub fn new(client: ClickHouseClient) -> Self {
        Self { client }
    }

    /// Builds the client and, when configured, creates the schema.
    pub async fn connect(config: ClickHouseConfig) -> Result<Self> {
        let init = config.init_schema;
        let client = ClickHouseClient::new(config);
        if init {
            schema::init_schema(&client).await?;
            info!(database = %client.config().database, "ClickHouse schema ready");
        }
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &ClickHouseClient {
        &self.client
    }
}

#[async_trait]
impl DurableStore for ClickHouseStore {
    async fn upsert_day(&self, day: &Day) -> Result<()> {
        insert::insert_day(&self.client, day).await
    }

    async fn upsert_month(&self, month: &Month) -> Result<()> {
        insert::insert_month(&self.client, month).await
    }

    async fn days_in_range(&self, domain: &str, from: &str, to: &str) -> Result<Vec<Day>> {
        query::fetch_days(&self.client, domain, from, to).await
    }

    async fn domains_with_days(&self, from: &str, to: &str) -> Result<Vec<String>> {
        query::day_domains(&self.client, from, to).await
    }

    async fn domains_with_days_before(&self, cutoff: &str) -> Result<Vec<(String, String)>> {
        Ok(query::domains_with_days_before(&self.client, cutoff)
            .await?
            .into_iter()
            .map(|row| (row.domain, row.oldest))
            .collect())
    }

    async fn months_in_range(&self, domain: &str, from: &str, to: &str) -> Result<Vec<Month>> {
        query::fetch_months(&self.client, domain, from, to).await
    }

    async fn delete_days(&self, domain: &str, from: &str, until: &str) -> Result<u64> {
        query::delete_days(&self.client, domain, from, until).await
    }

    async fn ping(&self) -> Result<()> {
        query::ping(&self.client).await
    }
}
