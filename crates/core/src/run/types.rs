//! Run and step record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of steps in every run.
pub const STEP_COUNT: usize = 8;

/// Error recorded on runs that no worker will finish.
pub const ABANDONED: &str = "abandoned";

/// The ordered steps of an ingestion run.
///
/// The order of [`PipelineStep::ALL`] is the execution order; each variant's
/// position doubles as the index of its record in [`Run::steps`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Start,
    Fetch,
    Normalize,
    StoreRevision,
    Diff,
    Analyze,
    UpsertTicket,
    Finish,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; STEP_COUNT] = [
        PipelineStep::Start,
        PipelineStep::Fetch,
        PipelineStep::Normalize,
        PipelineStep::StoreRevision,
        PipelineStep::Diff,
        PipelineStep::Analyze,
        PipelineStep::UpsertTicket,
        PipelineStep::Finish,
    ];

    /// Position of the step in the run's step array.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStep::Start => "start",
            PipelineStep::Fetch => "fetch",
            PipelineStep::Normalize => "normalize",
            PipelineStep::StoreRevision => "store_revision",
            PipelineStep::Diff => "diff",
            PipelineStep::Analyze => "analyze",
            PipelineStep::UpsertTicket => "upsert_ticket",
            PipelineStep::Finish => "finish",
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single step record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

/// Execution record of one step within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: PipelineStep,
    pub status: StepStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    pub fn pending(name: PipelineStep) -> Self {
        Self {
            name,
            status: StepStatus::Pending,
            attempts: 0,
            last_error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Enter `RUNNING` for a new attempt.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) {
        self.status = StepStatus::Running;
        self.attempts += 1;
        self.started_at = Some(now);
        self.completed_at = None;
    }

    pub fn succeed(&mut self, now: DateTime<Utc>) {
        self.status = StepStatus::Succeeded;
        self.completed_at = Some(now);
    }

    /// Record the error of a failed attempt; the step stays `RUNNING` until
    /// the orchestrator decides whether to retry.
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    pub fn fail(&mut self, now: DateTime<Utc>) {
        self.status = StepStatus::Failed;
        self.completed_at = Some(now);
    }

    pub fn skip(&mut self) {
        self.status = StepStatus::Skipped;
    }
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Succeeded => "SUCCEEDED",
            RunStatus::Failed => "FAILED",
            RunStatus::Canceled => "CANCELED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RUNNING" => Some(RunStatus::Running),
            "SUCCEEDED" => Some(RunStatus::Succeeded),
            "FAILED" => Some(RunStatus::Failed),
            "CANCELED" => Some(RunStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// What created a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

impl RunTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            RunTrigger::Scheduled => "scheduled",
            RunTrigger::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(RunTrigger::Scheduled),
            "manual" => Some(RunTrigger::Manual),
            _ => None,
        }
    }
}

/// Item counts written by the finish step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub fetched: u32,
    pub normalized: u32,
    pub stored: u32,
    pub changed: u32,
    pub analyzed: u32,
    pub tickets_created: u32,
}

/// One execution of the ingestion pipeline for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub source_id: String,
    pub trigger: RunTrigger,
    pub status: RunStatus,
    pub steps: [StepRecord; STEP_COUNT],
    pub cancel_requested: bool,
    pub counters: RunCounters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    /// A fresh run with every step pending.
    pub fn new(id: impl Into<String>, source_id: impl Into<String>, trigger: RunTrigger) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            trigger,
            status: RunStatus::Running,
            steps: Self::pending_steps(),
            cancel_requested: false,
            counters: RunCounters::default(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn pending_steps() -> [StepRecord; STEP_COUNT] {
        PipelineStep::ALL.map(StepRecord::pending)
    }

    pub fn step(&self, step: PipelineStep) -> &StepRecord {
        &self.steps[step.index()]
    }

    pub fn step_mut(&mut self, step: PipelineStep) -> &mut StepRecord {
        &mut self.steps[step.index()]
    }

    /// Mark every step from `from` onwards as skipped.
    pub fn skip_from(&mut self, from: usize) {
        for record in self.steps.iter_mut().skip(from) {
            record.skip();
        }
    }

    /// Fail the run at `step`, skipping every later step.
    pub fn fail_at(&mut self, step: PipelineStep, error: impl Into<String>, now: DateTime<Utc>) {
        let error = error.into();
        let record = self.step_mut(step);
        record.record_error(error.clone());
        record.fail(now);
        self.skip_from(step.index() + 1);
        self.status = RunStatus::Failed;
        self.error = Some(error);
        self.finished_at = Some(now);
    }

    /// Cancel the run before `step`, skipping it and every later step.
    pub fn cancel_before(&mut self, step: PipelineStep, now: DateTime<Utc>) {
        self.skip_from(step.index());
        self.status = RunStatus::Canceled;
        self.finished_at = Some(now);
    }

    /// Latest moment the run is known to have made progress.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.steps
            .iter()
            .flat_map(|s| [s.started_at, s.completed_at])
            .flatten()
            .chain(self.started_at)
            .max()
            .unwrap_or(self.created_at)
    }

    /// Fail a run that nobody will finish, at its first step that has not succeeded.
    pub fn abandon(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        let step = self
            .steps
            .iter()
            .find(|s| s.status != StepStatus::Succeeded)
            .map(|s| s.name)
            .unwrap_or(PipelineStep::Finish);
        self.fail_at(step, reason, now);
    }

    /// Check that the step records form a valid sequence for the run status.
    ///
    /// Terminal runs must be all-succeeded, succeeded then exactly one failure
    /// then skipped, or (canceled) succeeded then skipped.
    pub fn has_valid_step_sequence(&self) -> bool {
        if !self.status.is_terminal() {
            return true;
        }

        let succeeded = self
            .steps
            .iter()
            .take_while(|s| s.status == StepStatus::Succeeded)
            .count();
        let rest = &self.steps[succeeded..];

        match self.status {
            RunStatus::Succeeded => rest.is_empty(),
            RunStatus::Failed => {
                !rest.is_empty()
                    && rest[0].status == StepStatus::Failed
                    && rest[1..].iter().all(|s| s.status == StepStatus::Skipped)
            }
            RunStatus::Canceled => {
                !rest.is_empty() && rest.iter().all(|s| s.status == StepStatus::Skipped)
            }
            RunStatus::Running => true,
        }
    }
}
