//! Per-run reports and the bounded per-domain fan-out shared by the jobs.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Daily,
    Monthly,
    Retention,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => f.write_str("daily"),
            Self::Monthly => f.write_str("monthly"),
            Self::Retention => f.write_str("retention"),
        }
    }
}

/// What a job did for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum DomainOutcome {
    Persisted,
    SkippedEmpty,
    /// Compiled, but events arrived during the run. The domain stays pending
    /// and the next run compiles its whole day again.
    Changed,
    /// Days removed by the retention sweep.
    Deleted(u64),
    Failed(String),
}

impl DomainOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Outcome of one job run over one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub job: JobKind,
    /// `YYYYMMDD` for daily runs, `YYYYMM` for monthly ones, the cutoff day
    /// for retention.
    pub window: String,
    pub outcomes: BTreeMap<String, DomainOutcome>,
}

impl RunReport {
    pub fn new(job: JobKind, window: impl Into<String>) -> Self {
        Self {
            job,
            window: window.into(),
            outcomes: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, domain: impl Into<String>, outcome: DomainOutcome) {
        self.outcomes.insert(domain.into(), outcome);
    }

    fn count(&self, pred: impl Fn(&DomainOutcome) -> bool) -> usize {
        self.outcomes.values().filter(|o| pred(o)).count()
    }

    pub fn persisted(&self) -> usize {
        self.count(|o| matches!(o, DomainOutcome::Persisted))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DomainOutcome::SkippedEmpty))
    }

    pub fn failed(&self) -> usize {
        self.count(DomainOutcome::is_failed)
    }

    pub fn deleted(&self) -> u64 {
        self.outcomes
            .values()
            .map(|o| match o {
                DomainOutcome::Deleted(n) => *n,
                _ => 0,
            })
            .sum()
    }

    pub fn changed(&self) -> usize {
        self.count(|o| matches!(o, DomainOutcome::Changed))
    }

    /// No domain failed or needs another pass.
    pub fn is_clean(&self) -> bool {
        self.failed() == 0 && self.changed() == 0
    }
}

/// Runs `work` once per domain with at most `concurrency` in flight.
///
/// A task that panics leaves its domain reported as failed.
pub(crate) async fn for_each_domain<F, Fut>(
    domains: Vec<String>,
    concurrency: usize,
    work: F,
) -> BTreeMap<String, DomainOutcome>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = DomainOutcome> + Send + 'static,
{
    let mut outcomes: BTreeMap<String, DomainOutcome> = domains
        .iter()
        .map(|d| (d.clone(), DomainOutcome::Failed("task did not complete".to_string())))
        .collect();

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for domain in domains {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let fut = work(domain.clone());
        tasks.spawn(async move {
            let outcome = fut.await;
            drop(permit);
            (domain, outcome)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((domain, outcome)) => {
                outcomes.insert(domain, outcome);
            }
            Err(e) => error!(error = %e, "Domain task aborted"),
        }
    }

    outcomes
}
