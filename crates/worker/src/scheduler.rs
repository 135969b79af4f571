//! Worker scheduler for the batch jobs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use clickhouse_client::DurableStore;
use ephemeral_store::EphemeralStore;
use serde::{Deserialize, Serialize};
use telemetry::{health, metrics};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use tracking_core::window::yesterday;
use tracking_core::{MonthWindow, RetentionPolicy};

use crate::daily::DailyCompiler;
use crate::monthly::MonthlyReducer;
use crate::retention::RetentionWorker;

/// Job scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Run the loops inside `serve`. Disable when an external cron calls the CLI.
    pub enabled: bool,
    pub check_interval_secs: u64,
    /// Domains processed in parallel per job.
    pub job_concurrency: usize,
    pub retention_days: u32,
    pub metrics_log_interval_secs: u64,
    pub health_check_interval_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: 300,
            job_concurrency: 4,
            retention_days: tracking_core::limits::DEFAULT_RETENTION_DAYS,
            metrics_log_interval_secs: 60,
            health_check_interval_secs: 30,
        }
    }
}

impl JobsConfig {
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.retention_days)
    }
}

/// Pings both stores and records the result in the health registry.
pub async fn check_health(ephemeral: &dyn EphemeralStore, durable: &dyn DurableStore) {
    let registry = health();

    match ephemeral.ping().await {
        Ok(()) => registry.ephemeral.set_healthy(),
        Err(e) => {
            warn!(error = %e, "Ephemeral store unhealthy");
            registry.ephemeral.set_unhealthy(e.to_string());
        }
    }

    match durable.ping().await {
        Ok(()) => registry.durable.set_healthy(),
        Err(e) => {
            warn!(error = %e, "Durable store unhealthy");
            registry.durable.set_unhealthy(e.to_string());
        }
    }
}

/// What the batch loop has finished, carried between ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    /// Latest day compiled with no failed or changed domain.
    pub last_clean_day: Option<NaiveDate>,
    /// Latest month reduced and swept.
    pub last_reduced: Option<MonthWindow>,
}

/// Background job scheduler.
pub struct WorkerScheduler {
    config: JobsConfig,
    ephemeral: Arc<dyn EphemeralStore>,
    durable: Arc<dyn DurableStore>,
}

impl WorkerScheduler {
    pub fn new(
        config: JobsConfig,
        ephemeral: Arc<dyn EphemeralStore>,
        durable: Arc<dyn DurableStore>,
    ) -> Self {
        Self {
            config,
            ephemeral,
            durable,
        }
    }

    pub fn daily(&self) -> DailyCompiler {
        DailyCompiler::new(
            self.ephemeral.clone(),
            self.durable.clone(),
            self.config.job_concurrency,
        )
    }

    pub fn monthly(&self) -> MonthlyReducer {
        MonthlyReducer::new(self.durable.clone(), self.config.job_concurrency)
    }

    pub fn retention(&self) -> RetentionWorker {
        RetentionWorker::new(self.durable.clone(), self.config.retention_policy())
    }

    /// Starts all background loops.
    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        // Health and metrics run even with jobs disabled.
        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_health_checks().await;
        }));

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_metrics_log().await;
        }));

        if !self.config.enabled {
            info!("Batch jobs disabled");
            return handles;
        }

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_batch_loop().await;
        }));

        info!(
            check_interval_secs = self.config.check_interval_secs,
            concurrency = self.config.job_concurrency,
            "Background workers started"
        );
        handles
    }

    fn check_interval(&self) -> Duration {
        Duration::from_secs(self.config.check_interval_secs.max(1))
    }

    async fn run_batch_loop(&self) {
        let mut ticker = interval(self.check_interval());
        let mut progress = BatchProgress::default();

        loop {
            ticker.tick().await;
            self.run_batch(Utc::now().date_naive(), &mut progress).await;
        }
    }

    /// One scheduler tick as of `today`.
    ///
    /// Compiles yesterday, then reduces the previous month and sweeps. A month
    /// is only reduced once its last day has compiled cleanly.
    pub async fn run_batch(&self, today: NaiveDate, progress: &mut BatchProgress) {
        let day = yesterday(today);
        if progress.last_clean_day != Some(day) {
            // Domains that failed stay pending and are retried next tick.
            match self.daily().compile_day(day).await {
                Ok(report) if report.is_clean() => progress.last_clean_day = Some(day),
                Ok(report) => warn!(
                    day = %report.window,
                    failed = report.failed(),
                    changed = report.changed(),
                    "Daily compile incomplete, retrying next tick"
                ),
                Err(e) => error!(error = %e, "Daily compile error"),
            }
        }

        let month = MonthWindow::containing(today).previous();
        if progress.last_reduced == Some(month) {
            return;
        }
        if progress.last_clean_day < Some(month.last_day()) {
            debug!(month = %month, "Waiting for the month's last day to compile");
            return;
        }

        match self.monthly().reduce_month(month).await {
            Ok(report) if report.is_clean() => match self.retention().sweep(today).await {
                Ok(_) => progress.last_reduced = Some(month),
                Err(e) => error!(error = %e, "Retention sweep error"),
            },
            Ok(report) => warn!(
                month = %report.window,
                failed = report.failed(),
                "Monthly reduce incomplete, retrying next tick"
            ),
            Err(e) => error!(error = %e, "Monthly reduce error"),
        }
    }

    async fn run_metrics_log(&self) {
        let mut ticker = interval(Duration::from_secs(
            self.config.metrics_log_interval_secs.max(1),
        ));

        loop {
            ticker.tick().await;
            let s = metrics().snapshot();
            info!(
                events = s.events_recorded,
                pageviews = s.pageviews_recorded,
                sessions = s.sessions_started,
                spam = s.spam_rejected,
                store_errors = s.store_errors,
                days_compiled = s.days_compiled,
                months_reduced = s.months_reduced,
                days_deleted = s.days_deleted,
                record_latency_mean_ms = s.record_latency_mean_ms,
                "Metrics snapshot"
            );
        }
    }

    async fn run_health_checks(&self) {
        let mut ticker = interval(Duration::from_secs(
            self.config.health_check_interval_secs.max(1),
        ));

        loop {
            ticker.tick().await;
            check_health(self.ephemeral.as_ref(), self.durable.as_ref()).await;
        }
    }
}
