//! Background scheduler.
//!
//! Every worker runs one [`Scheduler`]. On each tick it tries each job's
//! named lock without blocking; jobs whose lock is held by another worker are
//! skipped for that tick. Job bodies run in their own task, so an error or a
//! panic is reported and the loop keeps going.

mod config;
pub mod jobs;
mod lock;
mod runner;

pub use config::SchedulerConfig;
pub use jobs::{EscalationSweepJob, IngestionScanJob, RetentionPurgeJob};
pub use lock::{
    InMemoryLockProvider, JobLock, LockError, LockGuard, LockProvider, SqliteLockProvider,
};
pub use runner::{JobError, JobResult, ScheduledJob, Scheduler, TickReport};
