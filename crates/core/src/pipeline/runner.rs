//! Drives one run through its steps.

use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::audit::AuditEvent;
use crate::metrics;
use crate::run::{PipelineStep, Run, RunStatus, ABANDONED};

use super::backoff::RetryPolicy;
use super::context::PipelineContext;
use super::steps::PipelineSteps;
use super::types::{PipelineDeps, PipelineError};

/// Outcome of driving one step to completion.
enum StepOutcome {
    Succeeded,
    Failed,
}

/// The pipeline orchestrator.
///
/// Steps run strictly in [`PipelineStep::ALL`] order on the calling task.
/// Every step transition is persisted before the next one begins.
#[derive(Clone)]
pub struct PipelineRunner {
    deps: PipelineDeps,
    steps: PipelineSteps,
}

impl PipelineRunner {
    pub fn new(deps: PipelineDeps) -> Self {
        let steps = PipelineSteps::new(deps.clone());
        Self { deps, steps }
    }

    /// Execute a run that was created for `source_id`.
    ///
    /// Returns the run in its terminal state. Step failures end the run as
    /// `FAILED` and are not errors here.
    pub async fn execute(&self, source_id: &str, run_id: &str) -> Result<Run, PipelineError> {
        let mut run = self
            .deps
            .runs
            .get(run_id)?
            .ok_or_else(|| PipelineError::RunNotFound(run_id.to_string()))?;

        if run.status.is_terminal() {
            return Err(PipelineError::AlreadyFinished {
                run_id: run.id,
                status: run.status,
            });
        }
        if run.source_id != source_id {
            return Err(PipelineError::SourceMismatch {
                run_id: run.id,
                expected: run.source_id,
                actual: source_id.to_string(),
            });
        }

        let clock = Instant::now();
        let now = Utc::now();
        run.steps = Run::pending_steps();
        run.started_at = Some(now);
        run.error = None;

        let source = match self.deps.sources.get(source_id) {
            Ok(source) => source,
            Err(e) => return Err(self.record_failure(run, e.into(), clock).await),
        };
        let Some(source) = source else {
            warn!(run_id = %run.id, source_id, "Source not found, failing run");
            run.fail_at(PipelineStep::Start, "source not found", now);
            self.deps.runs.save_progress(&run)?;
            self.finalize(&run, clock).await;
            return Ok(run);
        };

        let settings = match self.deps.settings.current() {
            Ok(settings) => settings,
            Err(e) => return Err(self.record_failure(run, e.into(), clock).await),
        };
        let policy = RetryPolicy::from_settings(&settings);
        if let Err(e) = self.deps.runs.save_progress(&run) {
            return Err(self.record_failure(run, e.into(), clock).await);
        }

        info!(run_id = %run.id, source_id, "Run started");
        if let Some(audit) = &self.deps.audit {
            audit
                .emit(AuditEvent::RunStarted {
                    run_id: run.id.clone(),
                    source_id: source_id.to_string(),
                })
                .await;
        }

        let mut ctx = PipelineContext::new(run, source, settings);

        if let Err(e) = self.drive(&mut ctx, &policy).await {
            return Err(self.record_failure(ctx.into_run(), e, clock).await);
        }

        let run = ctx.into_run();
        self.finalize(&run, clock).await;
        Ok(run)
    }

    /// Best-effort terminal write after an error that stopped the run.
    ///
    /// A run left `RUNNING` would keep its source from being scheduled again.
    async fn record_failure(&self, mut run: Run, e: PipelineError, clock: Instant) -> PipelineError {
        if !run.status.is_terminal() {
            run.abandon(e.to_string(), Utc::now());
        }
        if let Err(save) = self.deps.runs.save_progress(&run) {
            error!(run_id = %run.id, error = %save, "Could not record run failure");
        }
        self.finalize(&run, clock).await;
        e
    }

    /// Fail a queued run that will never be executed.
    ///
    /// Returns false when the run is missing or already terminal.
    pub fn abandon(&self, run_id: &str) -> Result<bool, PipelineError> {
        let Some(mut run) = self.deps.runs.get(run_id)? else {
            return Ok(false);
        };
        if run.status.is_terminal() {
            return Ok(false);
        }

        run.abandon(ABANDONED, Utc::now());
        self.deps.runs.save_progress(&run)?;
        warn!(run_id, source_id = %run.source_id, "Run abandoned");
        metrics::RUNS_FINISHED
            .with_label_values(&[RunStatus::Failed.as_str()])
            .inc();
        Ok(true)
    }

    async fn drive(&self, ctx: &mut PipelineContext, policy: &RetryPolicy) -> Result<(), PipelineError> {
        for step in PipelineStep::ALL {
            if step.index() > 0 && self.deps.runs.is_cancel_requested(&ctx.run.id)? {
                info!(run_id = %ctx.run.id, step = %step, "Run canceled");
                ctx.run.cancel_before(step, Utc::now());
                self.deps.runs.save_progress(&ctx.run)?;
                break;
            }

            match self.run_step(step, ctx, policy).await? {
                StepOutcome::Succeeded => {}
                StepOutcome::Failed => break,
            }
        }
        Ok(())
    }

    /// Attempt a step until it succeeds or its attempts are used up.
    async fn run_step(
        &self,
        step: PipelineStep,
        ctx: &mut PipelineContext,
        policy: &RetryPolicy,
    ) -> Result<StepOutcome, PipelineError> {
        let label = step.as_str();

        loop {
            ctx.run.step_mut(step).begin_attempt(Utc::now());
            self.deps.runs.save_progress(&ctx.run)?;
            metrics::STEP_ATTEMPTS.with_label_values(&[label]).inc();

            let started = Instant::now();
            let result = self.steps.execute(step, ctx).await;
            metrics::STEP_DURATION
                .with_label_values(&[label])
                .observe(started.elapsed().as_secs_f64());

            let e = match result {
                Ok(()) => {
                    ctx.run.step_mut(step).succeed(Utc::now());
                    self.deps.runs.save_progress(&ctx.run)?;
                    debug!(run_id = %ctx.run.id, step = label, "Step succeeded");
                    return Ok(StepOutcome::Succeeded);
                }
                Err(e) => e,
            };

            let message = e.to_string();
            ctx.run.step_mut(step).record_error(message.clone());
            self.deps.runs.save_progress(&ctx.run)?;

            let attempts = ctx.run.step(step).attempts;
            if policy.should_retry(attempts) {
                let delay = policy.delay_for(attempts - 1);
                warn!(
                    run_id = %ctx.run.id,
                    step = label,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Step failed, retrying"
                );
                if let Some(audit) = &self.deps.audit {
                    audit
                        .emit(AuditEvent::StepRetried {
                            run_id: ctx.run.id.clone(),
                            step: label.to_string(),
                            attempt: attempts,
                            error: message,
                            delay_ms: delay.as_millis() as u64,
                        })
                        .await;
                }
                tokio::time::sleep(delay).await;
                continue;
            }

            error!(
                run_id = %ctx.run.id,
                step = label,
                attempts,
                error = %message,
                "Step failed, giving up"
            );
            metrics::STEP_FAILURES.with_label_values(&[label]).inc();
            if let Some(audit) = &self.deps.audit {
                audit
                    .emit(AuditEvent::StepFailed {
                        run_id: ctx.run.id.clone(),
                        step: label.to_string(),
                        attempts,
                        error: message.clone(),
                    })
                    .await;
            }

            ctx.run.fail_at(step, message, Utc::now());
            self.deps.runs.save_progress(&ctx.run)?;
            return Ok(StepOutcome::Failed);
        }
    }

    async fn finalize(&self, run: &Run, clock: Instant) {
        let status = run.status.as_str();
        let elapsed = clock.elapsed();
        metrics::RUNS_FINISHED.with_label_values(&[status]).inc();
        metrics::RUN_DURATION
            .with_label_values(&[status])
            .observe(elapsed.as_secs_f64());

        match run.status {
            RunStatus::Failed => error!(
                run_id = %run.id,
                source_id = %run.source_id,
                error = run.error.as_deref().unwrap_or(""),
                "Run failed"
            ),
            _ => info!(
                run_id = %run.id,
                source_id = %run.source_id,
                status,
                fetched = run.counters.fetched,
                changed = run.counters.changed,
                tickets_created = run.counters.tickets_created,
                "Run finished"
            ),
        }

        if let Some(audit) = &self.deps.audit {
            audit
                .emit(AuditEvent::RunFinished {
                    run_id: run.id.clone(),
                    source_id: run.source_id.clone(),
                    status: status.to_string(),
                    error: run.error.clone(),
                    counters: run.counters,
                    duration_ms: elapsed.as_millis() as u64,
                })
                .await;
        }
    }
}
