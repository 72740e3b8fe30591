//! Pipeline types and errors.

use std::sync::Arc;

use thiserror::Error;

use crate::analysis::{AnalysisStore, ComplianceAnalyzer, RuleStore};
use crate::audit::AuditHandle;
use crate::connector::{ConnectorError, ConnectorRegistry};
use crate::content::ContentStore;
use crate::db::StoreError;
use crate::run::{RunStatus, RunStore};
use crate::settings::{SettingsError, SettingsProvider};
use crate::source::SourceStore;
use crate::ticket::TicketStore;

/// Error returned by a single step attempt.
///
/// Any error makes the attempt fail; the runner decides whether to retry.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Failed(String),
}

/// Errors that prevent the runner from driving a run at all.
///
/// Step failures are not errors at this level: they end the run as
/// `FAILED` and the run is returned normally.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("run {run_id} already finished with status {status:?}")]
    AlreadyFinished { run_id: String, status: RunStatus },

    #[error("run {run_id} belongs to source {expected}, not {actual}")]
    SourceMismatch {
        run_id: String,
        expected: String,
        actual: String,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
}

/// Work item consumed by the run worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunJob {
    pub source_id: String,
    pub run_id: String,
}

/// Collaborators shared by the runner and the steps.
#[derive(Clone)]
pub struct PipelineDeps {
    pub sources: Arc<dyn SourceStore>,
    pub runs: Arc<dyn RunStore>,
    pub content: Arc<dyn ContentStore>,
    pub rules: Arc<dyn RuleStore>,
    pub analyses: Arc<dyn AnalysisStore>,
    pub tickets: Arc<dyn TicketStore>,
    pub connectors: ConnectorRegistry,
    /// `None` when no analyzer is configured; changed content is then
    /// recorded as UNCERTAIN.
    pub analyzer: Option<Arc<dyn ComplianceAnalyzer>>,
    pub settings: Arc<dyn SettingsProvider>,
    pub audit: Option<AuditHandle>,
}
