//! Reads and deletions over compiled days and months.

use crate::client::ClickHouseClient;
use crate::insert::{DayRow, MonthRow};
use clickhouse::Row;
use serde::Deserialize;
use tracking_core::{Day, Error, Month, Result};

fn query_err(e: clickhouse::error::Error) -> Error {
    Error::durable(format!("Query error: {}", e))
}

/// Oldest stored day of one domain.
#[derive(Debug, Clone, Row, Deserialize)]
pub struct OldestDayRow {
    pub domain: String,
    pub oldest: String,
}

/// Days of one domain within `from..=to`, oldest first.
pub async fn fetch_days(
    client: &ClickHouseClient,
    domain: &str,
    from: &str,
    to: &str,
) -> Result<Vec<Day>> {
    let rows: Vec<DayRow> = client
        .inner()
        .query("SELECT domain, day, sessions, compiled_at FROM days FINAL WHERE domain = ? AND day >= ? AND day <= ? ORDER BY day")
        .bind(domain)
        .bind(from)
        .bind(to)
        .fetch_all()
        .await
        .map_err(query_err)?;

    rows.into_iter().map(DayRow::into_day).collect()
}

/// Distinct domains with at least one day within `from..=to`.
pub async fn day_domains(client: &ClickHouseClient, from: &str, to: &str) -> Result<Vec<String>> {
    client
        .inner()
        .query("SELECT DISTINCT domain FROM days WHERE day >= ? AND day <= ? ORDER BY domain")
        .bind(from)
        .bind(to)
        .fetch_all::<String>()
        .await
        .map_err(query_err)
}

/// Domains with days before `cutoff`, each with its oldest day.
pub async fn domains_with_days_before(
    client: &ClickHouseClient,
    cutoff: &str,
) -> Result<Vec<OldestDayRow>> {
    client
        .inner()
        .query("SELECT domain, min(day) AS oldest FROM days WHERE day < ? GROUP BY domain ORDER BY domain")
        .bind(cutoff)
        .fetch_all()
        .await
        .map_err(query_err)
}

/// Months of one domain within `from..=to`, oldest first.
pub async fn fetch_months(
    client: &ClickHouseClient,
    domain: &str,
    from: &str,
    to: &str,
) -> Result<Vec<Month>> {
    let rows: Vec<MonthRow> = client
        .inner()
        .query("SELECT domain, month, total_sessions, total_pageviews, total_score, bounces, bounce_rate, top_pages, top_referrers, top_referrer_scores, compiled_at FROM months FINAL WHERE domain = ? AND month >= ? AND month <= ? ORDER BY month")
        .bind(domain)
        .bind(from)
        .bind(to)
        .fetch_all()
        .await
        .map_err(query_err)?;

    rows.into_iter().map(MonthRow::into_month).collect()
}

/// Deletes days of one domain within `from..until` and returns how many
/// were removed.
pub async fn delete_days(
    client: &ClickHouseClient,
    domain: &str,
    from: &str,
    until: &str,
) -> Result<u64> {
    let count: u64 = client
        .inner()
        .query("SELECT count() FROM days FINAL WHERE domain = ? AND day >= ? AND day < ?")
        .bind(domain)
        .bind(from)
        .bind(until)
        .fetch_one()
        .await
        .map_err(query_err)?;

    if count == 0 {
        return Ok(0);
    }

    // Wait for the mutation so the returned count is settled.
    client
        .inner()
        .clone()
        .with_option("mutations_sync", "1")
        .query("ALTER TABLE days DELETE WHERE domain = ? AND day >= ? AND day < ?")
        .bind(domain)
        .bind(from)
        .bind(until)
        .execute()
        .await
        .map_err(|e| Error::durable(format!("Delete error: {}", e)))?;

    Ok(count)
}

pub async fn ping(client: &ClickHouseClient) -> Result<()> {
    client
        .inner()
        .query("SELECT 1")
        .fetch_one::<u8>()
        .await
        .map_err(query_err)?;
    Ok(())
}
