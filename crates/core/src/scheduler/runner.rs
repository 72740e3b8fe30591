//! Scheduler loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditError, AuditEvent, AuditHandle};
use crate::db::StoreError;
use crate::metrics;
use crate::pipeline::QueueError;
use crate::settings::SettingsError;

use super::lock::{JobLock, LockProvider};

/// Errors from a scheduled job body.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

/// A maintenance job run once per tick under its own lock.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    /// The lock serializing this job across workers.
    fn lock(&self) -> JobLock;

    async fn run(&self) -> Result<(), JobError>;
}

/// Outcome of one job within a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Completed,
    Failed(String),
    /// Another holder had the lock.
    Skipped,
}

impl JobResult {
    fn as_label(&self) -> &'static str {
        match self {
            JobResult::Completed => "completed",
            JobResult::Failed(_) => "failed",
            JobResult::Skipped => "skipped",
        }
    }
}

/// Per-job outcomes of one tick, in job order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub results: Vec<(JobLock, JobResult)>,
}

impl TickReport {
    pub fn get(&self, job: JobLock) -> Option<&JobResult> {
        self.results
            .iter()
            .find(|(j, _)| *j == job)
            .map(|(_, result)| result)
    }
}

/// Runs the registered jobs on a fixed interval.
pub struct Scheduler {
    jobs: Vec<Arc<dyn ScheduledJob>>,
    locks: Arc<dyn LockProvider>,
    tick_interval: Duration,
    audit: Option<AuditHandle>,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(locks: Arc<dyn LockProvider>, tick_interval: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            jobs: Vec::new(),
            locks,
            tick_interval,
            audit: None,
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Add a job; jobs run in registration order every tick.
    pub fn with_job(mut self, job: Arc<dyn ScheduledJob>) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the tick loop. Returns `None` if it is already running.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return None;
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let scheduler = Arc::clone(self);
        info!(
            tick_interval_secs = self.tick_interval.as_secs(),
            jobs = self.jobs.len(),
            "Starting scheduler"
        );

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = scheduler.tick().await;
                        debug!(?report, "Scheduler tick complete");
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Scheduler received shutdown signal");
                        break;
                    }
                }
            }
            scheduler.running.store(false, Ordering::SeqCst);
        }))
    }

    /// Signal the tick loop to stop after the current tick.
    pub fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            warn!("Scheduler not running");
            return;
        }
        let _ = self.shutdown_tx.send(());
    }

    /// Run every job once.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        for job in &self.jobs {
            let result = self.run_job(Arc::clone(job)).await;
            report.results.push((job.lock(), result));
        }
        report
    }

    async fn run_job(&self, job: Arc<dyn ScheduledJob>) -> JobResult {
        let lock = job.lock();
        let name = lock.key();

        let result = match self.locks.try_acquire(lock) {
            Ok(None) => {
                debug!(job = name, "Lock held elsewhere, skipping job");
                metrics::LOCK_SKIPS.with_label_values(&[name]).inc();
                JobResult::Skipped
            }
            Err(e) => JobResult::Failed(format!("lock error: {}", e)),
            Ok(Some(guard)) => {
                // The guard moves into the task so it is dropped even if the
                // body panics.
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    job.run().await
                });
                match handle.await {
                    Ok(Ok(())) => JobResult::Completed,
                    Ok(Err(e)) => JobResult::Failed(e.to_string()),
                    Err(e) if e.is_panic() => JobResult::Failed("job panicked".to_string()),
                    Err(e) => JobResult::Failed(e.to_string()),
                }
            }
        };

        metrics::SCHEDULER_JOBS
            .with_label_values(&[name, result.as_label()])
            .inc();

        if let JobResult::Failed(message) = &result {
            error!(job = name, error = %message, "Scheduled job failed");
            if let Some(audit) = &self.audit {
                audit
                    .emit(AuditEvent::SchedulerJobFailed {
                        job: name.to_string(),
                        error: message.clone(),
                    })
                    .await;
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::InMemoryLockProvider;
    use std::sync::atomic::AtomicUsize;

    struct CountingJob {
        lock: JobLock,
        runs: AtomicUsize,
        fail: bool,
    }

    impl CountingJob {
        fn new(lock: JobLock, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                lock,
                runs: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl ScheduledJob for CountingJob {
        fn lock(&self) -> JobLock {
            self.lock
        }

        async fn run(&self) -> Result<(), JobError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(JobError::Store(StoreError::Database("disk full".to_string())));
            }
            Ok(())
        }
    }

    struct PanickingJob;

    #[async_trait]
    impl ScheduledJob for PanickingJob {
        fn lock(&self) -> JobLock {
            JobLock::RetentionPurge
        }

        async fn run(&self) -> Result<(), JobError> {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn test_tick_reports_each_job() {
        let locks = Arc::new(InMemoryLockProvider::new());
        let ok = CountingJob::new(JobLock::IngestionScan, false);
        let failing = CountingJob::new(JobLock::EscalationScan, true);
        let scheduler = Scheduler::new(locks.clone(), Duration::from_secs(60))
            .with_job(ok.clone())
            .with_job(failing.clone());

        let report = scheduler.tick().await;
        assert_eq!(report.get(JobLock::IngestionScan), Some(&JobResult::Completed));
        assert!(matches!(
            report.get(JobLock::EscalationScan),
            Some(JobResult::Failed(msg)) if msg.contains("disk full")
        ));
        assert_eq!(ok.runs.load(Ordering::SeqCst), 1);
        assert_eq!(failing.runs.load(Ordering::SeqCst), 1);
        assert!(!locks.is_held(JobLock::EscalationScan));
    }

    #[tokio::test]
    async fn test_held_lock_skips_job() {
        let locks = Arc::new(InMemoryLockProvider::new());
        let job = CountingJob::new(JobLock::IngestionScan, false);
        let scheduler = Scheduler::new(locks.clone(), Duration::from_secs(60)).with_job(job.clone());

        let held = locks.try_acquire(JobLock::IngestionScan).unwrap();
        let report = scheduler.tick().await;
        assert_eq!(report.get(JobLock::IngestionScan), Some(&JobResult::Skipped));
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);

        drop(held);
        let report = scheduler.tick().await;
        assert_eq!(report.get(JobLock::IngestionScan), Some(&JobResult::Completed));
    }

    #[tokio::test]
    async fn test_panicking_job_releases_lock() {
        let locks = Arc::new(InMemoryLockProvider::new());
        let scheduler =
            Scheduler::new(locks.clone(), Duration::from_secs(60)).with_job(Arc::new(PanickingJob));

        let report = scheduler.tick().await;
        assert_eq!(
            report.get(JobLock::RetentionPurge),
            Some(&JobResult::Failed("job panicked".to_string()))
        );
        assert!(!locks.is_held(JobLock::RetentionPurge));
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let locks = Arc::new(InMemoryLockProvider::new());
        let job = CountingJob::new(JobLock::IngestionScan, false);
        let scheduler = Arc::new(
            Scheduler::new(locks, Duration::from_millis(10)).with_job(job.clone()),
        );

        let handle = scheduler.start().unwrap();
        assert!(scheduler.is_running());
        assert!(scheduler.start().is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop();
        handle.await.unwrap();

        assert!(!scheduler.is_running());
        assert!(job.runs.load(Ordering::SeqCst) >= 1);
    }
}
