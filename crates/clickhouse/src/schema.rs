//! ClickHouse table schemas.
//!
//! Both tables are `ReplacingMergeTree` keyed by domain and window, so a
//! re-run of a job replaces its earlier row. Reads use `FINAL` to see only
//! the latest version.

use crate::client::ClickHouseClient;
use tracking_core::{Error, Result};

/// Compiled days. `sessions` holds the JSON object of session id to
/// `{referrer, events}`.
pub const CREATE_DAYS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS {db}.days (
    domain String,
    day String,
    sessions String,
    compiled_at DateTime64(3)
)
ENGINE = ReplacingMergeTree(compiled_at)
PARTITION BY substring(day, 1, 6)
ORDER BY (domain, day)
"#;

/// Monthly rollups. Top lists are JSON arrays of `{"a": address, "c": count}`.
pub const CREATE_MONTHS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS {db}.months (
    domain String,
    month String,
    total_sessions UInt64,
    total_pageviews UInt64,
    total_score UInt64,
    bounces UInt64,
    bounce_rate UInt32,
    top_pages String,
    top_referrers String,
    top_referrer_scores String,
    compiled_at DateTime64(3)
)
ENGINE = ReplacingMergeTree(compiled_at)
ORDER BY (domain, month)
"#;

pub const CREATE_DATABASE: &str = "CREATE DATABASE IF NOT EXISTS {db}";

/// All statements, in execution order, for `database`.
pub fn all_statements(database: &str) -> Vec<String> {
    [CREATE_DATABASE, CREATE_DAYS_TABLE, CREATE_MONTHS_TABLE]
        .iter()
        .map(|sql| sql.replace("{db}", database))
        .collect()
}

/// Creates the database and tables if they don't exist.
pub async fn init_schema(client: &ClickHouseClient) -> Result<()> {
    // The database may not exist yet, so DDL runs without a default database.
    let admin = client.inner().clone().with_database("default");
    for sql in all_statements(&client.config().database) {
        admin
            .query(&sql)
            .execute()
            .await
            .map_err(|e| Error::durable(format!("Schema init error: {}", e)))?;
    }
    Ok(())
}
