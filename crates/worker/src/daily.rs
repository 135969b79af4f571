//! Daily compiler: drains one day of session lists into durable days.

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use clickhouse_client::DurableStore;
use ephemeral_store::{EphemeralStore, Eviction};
use telemetry::metrics;
use tracing::{debug, error, info, warn};
use tracking_core::window::format_day;
use tracking_core::Result;

use crate::report::{for_each_domain, DomainOutcome, JobKind, RunReport};

pub struct DailyCompiler {
    ephemeral: Arc<dyn EphemeralStore>,
    durable: Arc<dyn DurableStore>,
    concurrency: usize,
}

impl DailyCompiler {
    pub fn new(
        ephemeral: Arc<dyn EphemeralStore>,
        durable: Arc<dyn DurableStore>,
        concurrency: usize,
    ) -> Self {
        Self {
            ephemeral,
            durable,
            concurrency,
        }
    }

    /// Compiles every pending domain of `day`.
    ///
    /// Fails only when the pending set cannot be read. Per-domain failures
    /// land in the report and keep that domain's session lists for a re-run.
    pub async fn compile_day(&self, day: NaiveDate) -> Result<RunReport> {
        let day = format_day(day);
        let start = Instant::now();

        let domains = self.ephemeral.pending_domains(&day).await?;
        info!(day = %day, domains = domains.len(), "Compiling day");

        let outcomes = for_each_domain(domains, self.concurrency, |domain| {
            let ephemeral = self.ephemeral.clone();
            let durable = self.durable.clone();
            let day = day.clone();
            async move { compile_domain(ephemeral.as_ref(), durable.as_ref(), &day, &domain).await }
        })
        .await;

        let report = RunReport {
            job: JobKind::Daily,
            window: day,
            outcomes,
        };

        let m = metrics();
        m.days_compiled.inc_by(report.persisted() as u64);
        m.days_skipped.inc_by(report.skipped() as u64);
        m.days_failed.inc_by(report.failed() as u64);
        m.compile_latency_ms.observe(start.elapsed().as_millis() as u64);

        info!(
            day = %report.window,
            persisted = report.persisted(),
            skipped = report.skipped(),
            changed = report.changed(),
            failed = report.failed(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Daily compile complete"
        );
        Ok(report)
    }
}

async fn compile_domain(
    ephemeral: &dyn EphemeralStore,
    durable: &dyn DurableStore,
    day: &str,
    domain: &str,
) -> DomainOutcome {
    let raw = match ephemeral.read_day(day, domain).await {
        Ok(raw) => raw,
        Err(e) => {
            error!(day, domain, error = %e, "Failed to read session lists");
            return DomainOutcome::Failed(e.to_string());
        }
    };

    let (compiled, skipped) = raw.assemble();
    if skipped > 0 {
        warn!(day, domain, skipped, "Skipped undecodable events");
        metrics().events_skipped.inc_by(skipped as u64);
    }

    if compiled.is_empty() {
        debug!(day, domain, "No sessions with events");
        return match ephemeral.evict(&raw).await {
            Ok(Eviction::Changed) => DomainOutcome::Changed,
            Ok(Eviction::Evicted) => DomainOutcome::SkippedEmpty,
            Err(e) => {
                warn!(day, domain, error = %e, "Failed to clear empty domain");
                DomainOutcome::SkippedEmpty
            }
        };
    }

    if let Err(e) = durable.upsert_day(&compiled).await {
        error!(day, domain, error = %e, "Failed to persist day");
        return DomainOutcome::Failed(e.to_string());
    }

    debug!(day, domain, sessions = compiled.sessions.len(), "Persisted day");

    // The day is safe; a failed eviction only leaves work for an idempotent re-run.
    match ephemeral.evict(&raw).await {
        Ok(Eviction::Evicted) => DomainOutcome::Persisted,
        Ok(Eviction::Changed) => {
            info!(day, domain, "Events arrived while compiling, keeping session lists");
            DomainOutcome::Changed
        }
        Err(e) => {
            warn!(day, domain, error = %e, "Persisted day but failed to evict session lists");
            DomainOutcome::Persisted
        }
    }
}
