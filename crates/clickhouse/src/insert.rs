//! Row types and inserts for compiled days and months.

use crate::client::ClickHouseClient;
use chrono::Utc;
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use tracking_core::{Day, Entry, Error, Month, Result, Session};

/// A compiled day as stored in `days`.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct DayRow {
    pub domain: String,
    pub day: String,
    pub sessions: String,
    pub compiled_at: i64, // milliseconds since epoch
}

impl DayRow {
    pub fn from_day(day: &Day) -> Result<Self> {
        Ok(Self {
            domain: day.domain.clone(),
            day: day.day.clone(),
            sessions: serde_json::to_string(&day.sessions)?,
            compiled_at: Utc::now().timestamp_millis(),
        })
    }

    pub fn into_day(self) -> Result<Day> {
        let sessions: BTreeMap<String, Session> = serde_json::from_str(&self.sessions)?;
        Ok(Day {
            domain: self.domain,
            day: self.day,
            sessions,
        })
    }
}

/// A month record as stored in `months`.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct MonthRow {
    pub domain: String,
    pub month: String,
    pub total_sessions: u64,
    pub total_pageviews: u64,
    pub total_score: u64,
    pub bounces: u64,
    pub bounce_rate: u32,
    pub top_pages: String,
    pub top_referrers: String,
    pub top_referrer_scores: String,
    pub compiled_at: i64,
}

impl MonthRow {
    pub fn from_month(month: &Month) -> Result<Self> {
        Ok(Self {
            domain: month.domain.clone(),
            month: month.month.clone(),
            total_sessions: month.total_sessions,
            total_pageviews: month.total_pageviews,
            total_score: month.total_score,
            bounces: month.bounces,
            bounce_rate: month.bounce_rate,
            top_pages: serde_json::to_string(&month.top_pages)?,
            top_referrers: serde_json::to_string(&month.top_referrers)?,
            top_referrer_scores: serde_json::to_string(&month.top_referrer_scores)?,
            compiled_at: Utc::now().timestamp_millis(),
        })
    }

    pub fn into_month(self) -> Result<Month> {
        let entries = |raw: &str| -> Result<Vec<Entry>> { Ok(serde_json::from_str(raw)?) };
        Ok(Month {
            top_pages: entries(&self.top_pages)?,
            top_referrers: entries(&self.top_referrers)?,
            top_referrer_scores: entries(&self.top_referrer_scores)?,
            domain: self.domain,
            month: self.month,
            total_sessions: self.total_sessions,
            total_pageviews: self.total_pageviews,
            total_score: self.total_score,
            bounces: self.bounces,
            bounce_rate: self.bounce_rate,
        })
    }
}

/// Writes one day, replacing any earlier version.
pub async fn insert_day(client: &ClickHouseClient, day: &Day) -> Result<()> {
    let row = DayRow::from_day(day)?;
    let start = std::time::Instant::now();

    let mut insert = client
        .inner()
        .insert("days")
        .map_err(|e| Error::durable(format!("Insert error: {}", e)))?;
    insert
        .write(&row)
        .await
        .map_err(|e| Error::durable(format!("Write error: {}", e)))?;
    insert
        .end()
        .await
        .map_err(|e| Error::durable(format!("End error: {}", e)))?;

    debug!(
        domain = %day.domain,
        day = %day.day,
        sessions = day.sessions.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Inserted day"
    );
    Ok(())
}

/// Writes one month, replacing any earlier version.
pub async fn insert_month(client: &ClickHouseClient, month: &Month) -> Result<()> {
    let row = MonthRow::from_month(month)?;

    let mut insert = client
        .inner()
        .insert("months")
        .map_err(|e| Error::durable(format!("Insert error: {}", e)))?;
    insert
        .write(&row)
        .await
        .map_err(|e| Error::durable(format!("Write error: {}", e)))?;
    insert
        .end()
        .await
        .map_err(|e| Error::durable(format!("End error: {}", e)))?;

    debug!(domain = %month.domain, month = %month.month, "Inserted month");
    Ok(())
}
