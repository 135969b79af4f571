//! Monthly reducer: folds a month of compiled days into one record per domain.

use std::sync::Arc;
use std::time::Instant;

use clickhouse_client::DurableStore;
use telemetry::metrics;
use tracing::{debug, error, info};
use tracking_core::rollup::reduce_month;
use tracking_core::{MonthWindow, Result};

use crate::report::{for_each_domain, DomainOutcome, JobKind, RunReport};

pub struct MonthlyReducer {
    durable: Arc<dyn DurableStore>,
    concurrency: usize,
}

impl MonthlyReducer {
    pub fn new(durable: Arc<dyn DurableStore>, concurrency: usize) -> Self {
        Self {
            durable,
            concurrency,
        }
    }

    /// Reduces every domain with days in `month`.
    ///
    /// Re-running replaces each month with an identical record.
    pub async fn reduce_month(&self, month: MonthWindow) -> Result<RunReport> {
        let label = month.to_string();
        let (from, to) = month.day_range();
        let start = Instant::now();

        let domains = self.durable.domains_with_days(&from, &to).await?;
        info!(month = %label, domains = domains.len(), "Reducing month");

        let outcomes = for_each_domain(domains, self.concurrency, |domain| {
            let durable = self.durable.clone();
            let (label, from, to) = (label.clone(), from.clone(), to.clone());
            async move { reduce_domain(durable.as_ref(), &domain, &label, &from, &to).await }
        })
        .await;

        let report = RunReport {
            job: JobKind::Monthly,
            window: label,
            outcomes,
        };

        let m = metrics();
        m.months_reduced.inc_by(report.persisted() as u64);
        m.months_skipped.inc_by(report.skipped() as u64);
        m.months_failed.inc_by(report.failed() as u64);

        info!(
            month = %report.window,
            persisted = report.persisted(),
            skipped = report.skipped(),
            failed = report.failed(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Monthly reduce complete"
        );
        Ok(report)
    }
}

async fn reduce_domain(
    durable: &dyn DurableStore,
    domain: &str,
    month: &str,
    from: &str,
    to: &str,
) -> DomainOutcome {
    let days = match durable.days_in_range(domain, from, to).await {
        Ok(days) => days,
        Err(e) => {
            error!(domain, month, error = %e, "Failed to load days");
            return DomainOutcome::Failed(e.to_string());
        }
    };

    let record = reduce_month(domain, month, &days);
    if record.is_zero() {
        debug!(domain, month, "Month has no traffic");
        return DomainOutcome::SkippedEmpty;
    }

    match durable.upsert_month(&record).await {
        Ok(()) => DomainOutcome::Persisted,
        Err(e) => {
            error!(domain, month, error = %e, "Failed to persist month");
            DomainOutcome::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clickhouse_client::MemoryDurableStore;
    use tracking_core::{Day, Event, Session};

    async fn seed(store: &MemoryDurableStore, domain: &str, day: &str, sessions: usize) {
        let mut d = Day::new(domain, day);
        for i in 0..sessions {
            d.insert_session(i.to_string(), Session::new("", vec![Event::Page("/landing".into())]));
        }
        store.upsert_day(&d).await.unwrap();
    }

    #[tokio::test]
    async fn test_reduce_all_domains() {
        let durable = Arc::new(MemoryDurableStore::new());
        seed(&durable, "a.com", "20240301", 10).await;
        seed(&durable, "b.com", "20240315", 2).await;
        seed(&durable, "c.com", "20240401", 1).await;

        let reducer = MonthlyReducer::new(durable.clone(), 2);
        let report = reducer
            .reduce_month(MonthWindow::parse("202403").unwrap())
            .await
            .unwrap();

        assert_eq!(report.persisted(), 2);
        assert!(!report.outcomes.contains_key("c.com"));

        let month = durable.month("a.com", "202403").unwrap();
        assert_eq!(month.total_sessions, 10);
        assert_eq!(month.bounce_rate, 10000);
        assert_eq!(month.top_pages[0].address, "/landing");
    }

    #[tokio::test]
    async fn test_rerun_yields_identical_record() {
        let durable = Arc::new(MemoryDurableStore::new());
        seed(&durable, "a.com", "20240301", 3).await;
        seed(&durable, "a.com", "20240302", 4).await;

        let reducer = MonthlyReducer::new(durable.clone(), 1);
        let window = MonthWindow::parse("202403").unwrap();

        reducer.reduce_month(window).await.unwrap();
        let first = serde_json::to_vec(&durable.month("a.com", "202403")).unwrap();
        reducer.reduce_month(window).await.unwrap();
        let second = serde_json::to_vec(&durable.month("a.com", "202403")).unwrap();

        assert_eq!(first, second);
        assert_eq!(durable.month_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let durable = Arc::new(MemoryDurableStore::new());
        seed(&durable, "a.com", "20240301", 1).await;
        seed(&durable, "bad.com", "20240301", 1).await;
        durable.fail_writes_for("bad.com");

        let report = MonthlyReducer::new(durable.clone(), 4)
            .reduce_month(MonthWindow::parse("202403").unwrap())
            .await
            .unwrap();
        assert_eq!(report.outcomes["a.com"], DomainOutcome::Persisted);
        assert!(report.outcomes["bad.com"].is_failed());
    }
}
