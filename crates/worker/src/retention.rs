//! Retention sweep for compiled days.
//!
//! Days older than the policy horizon are deleted once the month covering
//! them has been reduced. Months never expire.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use clickhouse_client::DurableStore;
use telemetry::metrics;
use tracing::{debug, info, warn};
use tracking_core::window::{format_day, parse_day};
use tracking_core::{Result, RetentionPolicy};

use crate::report::{DomainOutcome, JobKind, RunReport};

pub struct RetentionWorker {
    durable: Arc<dyn DurableStore>,
    policy: RetentionPolicy,
}

impl RetentionWorker {
    pub fn new(durable: Arc<dyn DurableStore>, policy: RetentionPolicy) -> Self {
        Self { durable, policy }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Deletes expired days as of `today`. Domains are swept one at a time;
    /// a failing domain is reported and the sweep moves on.
    pub async fn sweep(&self, today: NaiveDate) -> Result<RunReport> {
        let cutoff = self.policy.cutoff(today);
        info!(
            cutoff = %cutoff,
            retention_days = self.policy.retention_days,
            "Running retention sweep"
        );

        let domains = self.durable.domains_with_days_before(&cutoff).await?;
        let mut report = RunReport::new(JobKind::Retention, cutoff.clone());

        for (domain, oldest) in domains {
            let outcome = match self.sweep_domain(&domain, &oldest, &cutoff, today).await {
                Ok(0) => DomainOutcome::SkippedEmpty,
                Ok(n) => DomainOutcome::Deleted(n),
                Err(e) => {
                    warn!(domain = %domain, error = %e, "Retention failed for domain");
                    DomainOutcome::Failed(e.to_string())
                }
            };
            report.record(domain, outcome);
        }

        metrics().days_deleted.inc_by(report.deleted());
        info!(
            cutoff = %report.window,
            deleted = report.deleted(),
            failed = report.failed(),
            "Retention sweep complete"
        );
        Ok(report)
    }

    async fn sweep_domain(
        &self,
        domain: &str,
        oldest: &str,
        cutoff: &str,
        today: NaiveDate,
    ) -> Result<u64> {
        let oldest = parse_day(oldest)?;
        let expired = self.policy.expired_months(oldest, today);
        let (Some(first), Some(last)) = (expired.first(), expired.last()) else {
            return Ok(0);
        };

        let reduced: HashSet<String> = self
            .durable
            .months_in_range(domain, &first.to_string(), &last.to_string())
            .await?
            .into_iter()
            .map(|m| m.month)
            .collect();

        let mut deleted = 0;
        for month in expired {
            let label = month.to_string();
            if !reduced.contains(&label) {
                debug!(domain, month = %label, "Month not reduced yet, keeping its days");
                continue;
            }

            let from = format_day(month.first_day());
            let next = format_day(month.next().first_day());
            let until = next.as_str().min(cutoff);

            let n = self.durable.delete_days(domain, &from, until).await?;
            if n > 0 {
                info!(domain, month = %label, deleted = n, "Deleted expired days");
            }
            deleted += n;
        }

        Ok(deleted)
    }
}
