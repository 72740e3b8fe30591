//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Pipeline (runs, step attempts, failures, durations)
//! - Tickets (creation, escalation, overdue flags)
//! - Scheduler (job outcomes, lock skips, retention deletions)
//! - External services (web fetches, LLM)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Runs reaching a terminal status.
pub static RUNS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("compliance_watch_runs_total", "Total finished pipeline runs"),
        &["status"], // "succeeded", "failed", "canceled"
    )
    .unwrap()
});

/// Run duration in seconds, from start to terminal status.
pub static RUN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "compliance_watch_run_duration_seconds",
            "Duration of pipeline runs",
        )
        .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 900.0]),
        &["status"],
    )
    .unwrap()
});

/// Step attempts by step name.
pub static STEP_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("compliance_watch_step_attempts_total", "Total step attempts"),
        &["step"],
    )
    .unwrap()
});

/// Steps that exhausted their attempts.
pub static STEP_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "compliance_watch_step_failures_total",
            "Steps failed after exhausting retries",
        ),
        &["step"],
    )
    .unwrap()
});

/// Duration of a single step attempt.
pub static STEP_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "compliance_watch_step_duration_seconds",
            "Duration of one step attempt",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]),
        &["step"],
    )
    .unwrap()
});

/// Revisions created because content changed.
pub static REVISIONS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "compliance_watch_revisions_created_total",
        "Total content revisions created",
    )
    .unwrap()
});

/// Analyses stored, by compliance status.
pub static ANALYSES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("compliance_watch_analyses_total", "Total stored analyses"),
        &["status"],
    )
    .unwrap()
});

// =============================================================================
// Ticket Metrics
// =============================================================================

/// Tickets created, by risk level.
pub static TICKETS_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("compliance_watch_tickets_created_total", "Total tickets created"),
        &["risk"],
    )
    .unwrap()
});

/// Ticket escalations, by the level reached.
pub static TICKETS_ESCALATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "compliance_watch_tickets_escalated_total",
            "Total ticket escalations",
        ),
        &["level"],
    )
    .unwrap()
});

/// Tickets flagged overdue.
pub static TICKETS_OVERDUE: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "compliance_watch_tickets_overdue_total",
        "Total tickets marked overdue",
    )
    .unwrap()
});

// =============================================================================
// Scheduler Metrics
// =============================================================================

/// Scheduler job executions by job and outcome.
pub static SCHEDULER_JOBS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "compliance_watch_scheduler_jobs_total",
            "Scheduler job executions",
        ),
        &["job", "result"], // result: "completed", "failed", "skipped"
    )
    .unwrap()
});

/// Ticks where a job was skipped because another worker held its lock.
pub static LOCK_SKIPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "compliance_watch_lock_skips_total",
            "Job executions skipped because the lock was held",
        ),
        &["job"],
    )
    .unwrap()
});

/// Rows deleted by the retention purge.
pub static RETENTION_DELETED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "compliance_watch_retention_deleted_total",
            "Rows deleted by the retention purge",
        ),
        &["kind"], // "audit_events", "runs"
    )
    .unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// External service request duration.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "compliance_watch_external_request_duration_seconds",
            "Duration of external service requests",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["service"], // "web", "llm"
    )
    .unwrap()
});

/// External service requests by result.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "compliance_watch_external_requests_total",
            "Total external service requests",
        ),
        &["service", "result"], // result: "success", "error"
    )
    .unwrap()
});

/// LLM token usage.
pub static LLM_TOKENS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("compliance_watch_llm_tokens_total", "Total LLM tokens used"),
        &["provider", "direction"], // direction: "input", "output"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Pipeline
        Box::new(RUNS_FINISHED.clone()),
        Box::new(RUN_DURATION.clone()),
        Box::new(STEP_ATTEMPTS.clone()),
        Box::new(STEP_FAILURES.clone()),
        Box::new(STEP_DURATION.clone()),
        Box::new(REVISIONS_CREATED.clone()),
        Box::new(ANALYSES_TOTAL.clone()),
        // Tickets
        Box::new(TICKETS_CREATED.clone()),
        Box::new(TICKETS_ESCALATED.clone()),
        Box::new(TICKETS_OVERDUE.clone()),
        // Scheduler
        Box::new(SCHEDULER_JOBS.clone()),
        Box::new(LOCK_SKIPS.clone()),
        Box::new(RETENTION_DELETED.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
        Box::new(LLM_TOKENS.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn test_all_metrics_register() {
        let registry = Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        STEP_ATTEMPTS.with_label_values(&["fetch"]).inc();
        assert!(registry
            .gather()
            .iter()
            .any(|family| family.get_name() == "compliance_watch_step_attempts_total"));
    }
}
