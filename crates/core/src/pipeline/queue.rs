//! Run queue and the worker that drains it.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tracing::{error, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::db::StoreError;
use crate::run::{PipelineStep, Run, RunStore, RunTrigger};

use super::runner::PipelineRunner;
use super::types::{PipelineError, RunJob};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("run queue is closed")]
    Closed,
}

/// Sending side of the run queue. Cheaply cloneable.
#[derive(Clone)]
pub struct RunQueue {
    tx: mpsc::Sender<RunJob>,
}

impl RunQueue {
    /// Create a queue with room for `capacity` pending jobs.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RunJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue a job, waiting for capacity.
    pub async fn enqueue(&self, job: RunJob) -> Result<(), QueueError> {
        self.tx.send(job).await.map_err(|_| QueueError::Closed)
    }
}

/// Creates runs and hands them to the run queue.
///
/// Used by the ingestion scan and by the manual trigger route.
#[derive(Clone)]
pub struct RunDispatcher {
    runs: Arc<dyn RunStore>,
    queue: RunQueue,
    audit: Option<AuditHandle>,
}

impl RunDispatcher {
    pub fn new(runs: Arc<dyn RunStore>, queue: RunQueue) -> Self {
        Self {
            runs,
            queue,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Create a run for the source and enqueue it.
    pub async fn trigger(&self, source_id: &str, trigger: RunTrigger) -> Result<Run, QueueError> {
        let mut run = self.runs.create(source_id, trigger)?;

        let job = RunJob {
            source_id: source_id.to_string(),
            run_id: run.id.clone(),
        };
        if let Err(e) = self.queue.enqueue(job).await {
            // A run nobody will execute would block the source forever.
            run.fail_at(PipelineStep::Start, e.to_string(), Utc::now());
            self.runs.save_progress(&run)?;
            return Err(e);
        }

        info!(run_id = %run.id, source_id, trigger = trigger.as_str(), "Run queued");
        if let Some(audit) = &self.audit {
            audit
                .emit(AuditEvent::RunQueued {
                    run_id: run.id.clone(),
                    source_id: source_id.to_string(),
                    trigger: trigger.as_str().to_string(),
                })
                .await;
        }
        Ok(run)
    }
}

/// Consumes the run queue, executing up to `max_concurrent` runs at a time.
pub struct RunWorker {
    rx: mpsc::Receiver<RunJob>,
    runner: Arc<PipelineRunner>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl RunWorker {
    pub fn new(rx: mpsc::Receiver<RunJob>, runner: Arc<PipelineRunner>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            rx,
            runner,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Run until every queue handle is dropped or shutdown is signaled,
    /// then wait for in-flight runs.
    ///
    /// Jobs still queued at shutdown are failed as abandoned.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(max_concurrent = self.max_concurrent, "Run worker started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Run worker received shutdown signal");
                    break;
                }
                job = self.rx.recv() => match job {
                    Some(job) => self.dispatch(job).await,
                    None => break,
                },
            }
        }

        self.rx.close();
        while let Ok(job) = self.rx.try_recv() {
            if let Err(e) = self.runner.abandon(&job.run_id) {
                error!(run_id = %job.run_id, error = %e, "Could not fail abandoned run");
            }
        }

        let _ = self
            .semaphore
            .acquire_many(self.max_concurrent as u32)
            .await;
        info!("Run worker stopped");
    }

    async fn dispatch(&self, job: RunJob) {
        let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
            warn!(run_id = %job.run_id, "Run worker semaphore closed, dropping job");
            return;
        };

        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            let _permit = permit;
            match runner.execute(&job.source_id, &job.run_id).await {
                Ok(_) => {}
                Err(PipelineError::AlreadyFinished { run_id, status }) => {
                    warn!(run_id = %run_id, status = status.as_str(), "Skipping finished run");
                }
                Err(e) => {
                    error!(run_id = %job.run_id, source_id = %job.source_id, error = %e, "Run could not be executed");
                }
            }
        });
    }
}
