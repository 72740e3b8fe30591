//! Run trigger, cancel and inspection handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use compliance_watch_core::{
    run::{RunCounters, StepStatus},
    AuditEvent, PipelineStep, QueueError, Run, RunStatus, RunTrigger, StoreError,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::state::AppState;

/// Error response
#[derive(Debug, Serialize)]
pub struct RunErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(RunErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn store_error(e: StoreError) -> Response {
    error!(error = %e, "Run store error");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Response for cancel requests
#[derive(Debug, Serialize)]
pub struct CancelRunResponse {
    pub run_id: String,
    /// False when the run had already finished.
    pub cancel_requested: bool,
    pub status: RunStatus,
}

/// Per-step summary in run responses
#[derive(Debug, Serialize)]
pub struct StepSummary {
    pub name: PipelineStep,
    pub status: StepStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Response for run operations
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub id: String,
    pub source_id: String,
    pub trigger: RunTrigger,
    pub status: RunStatus,
    pub cancel_requested: bool,
    pub steps: Vec<StepSummary>,
    pub counters: RunCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

impl From<Run> for RunResponse {
    fn from(run: Run) -> Self {
        Self {
            steps: run
                .steps
                .iter()
                .map(|s| StepSummary {
                    name: s.name,
                    status: s.status,
                    attempts: s.attempts,
                    last_error: s.last_error.clone(),
                })
                .collect(),
            id: run.id,
            source_id: run.source_id,
            trigger: run.trigger,
            status: run.status,
            cancel_requested: run.cancel_requested,
            counters: run.counters,
            error: run.error,
            created_at: run.created_at.to_rfc3339(),
            started_at: run.started_at.map(|t| t.to_rfc3339()),
            finished_at: run.finished_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Create a manual run for a source and queue it
pub async fn trigger_run(
    State(state): State<Arc<AppState>>,
    Path(source_id): Path<String>,
) -> Response {
    match state.sources().get(&source_id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("Source not found: {}", source_id),
            )
        }
        Err(e) => return store_error(e),
    }

    match state.runs().has_running(&source_id) {
        Ok(false) => {}
        Ok(true) => {
            return error_response(
                StatusCode::CONFLICT,
                format!("Source {} already has a run in progress", source_id),
            )
        }
        Err(e) => return store_error(e),
    }

    match state
        .dispatcher()
        .trigger(&source_id, RunTrigger::Manual)
        .await
    {
        Ok(run) => (StatusCode::ACCEPTED, Json(RunResponse::from(run))).into_response(),
        Err(QueueError::Closed) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Run queue is closed")
        }
        Err(QueueError::Store(e)) => store_error(e),
    }
}

/// Get a run with its step records
pub async fn get_run(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.runs().get(&id) {
        Ok(Some(run)) => Json(RunResponse::from(run)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("Run not found: {}", id)),
        Err(e) => store_error(e),
    }
}

/// Request cancellation of a run
///
/// Takes effect before the run's next step. Finished runs are left as they are.
pub async fn cancel_run(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let requested = match state.runs().request_cancel(&id) {
        Ok(requested) => requested,
        Err(e) => return store_error(e),
    };

    let run = match state.runs().get(&id) {
        Ok(Some(run)) => run,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, format!("Run not found: {}", id)),
        Err(e) => return store_error(e),
    };

    if requested {
        info!(run_id = %id, "Run cancel requested");
        state.audit().try_emit(AuditEvent::RunCancelRequested {
            run_id: id.clone(),
            requested_by: "api".to_string(),
        });
    }

    Json(CancelRunResponse {
        run_id: run.id,
        cancel_requested: requested,
        status: run.status,
    })
    .into_response()
}
