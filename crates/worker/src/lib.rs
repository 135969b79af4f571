//! Batch jobs for the tracking engine.
//!
//! - Daily compiler (ephemeral session lists → compiled days)
//! - Monthly reducer (compiled days → month records)
//! - Retention sweep (drops days whose month is reduced)
//! - Scheduler running the above on intervals

pub mod daily;
pub mod monthly;
pub mod report;
pub mod retention;
pub mod scheduler;

pub use daily::DailyCompiler;
pub use monthly::MonthlyReducer;
pub use report::{DomainOutcome, JobKind, RunReport};
pub use retention::RetentionWorker;
pub use scheduler::{check_health, BatchProgress, JobsConfig, WorkerScheduler};
