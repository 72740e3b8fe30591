//! Run storage trait.

use chrono::{DateTime, Utc};

use crate::db::StoreError;

use super::{Run, RunTrigger};

/// Trait for run storage backends.
///
/// The cancel flag is owned by external actors: [`RunStore::save_progress`]
/// never writes it, so a cancellation requested mid-step survives the
/// orchestrator's next save.
pub trait RunStore: Send + Sync {
    /// Create a new run in `RUNNING` status with all steps pending.
    fn create(&self, source_id: &str, trigger: RunTrigger) -> Result<Run, StoreError>;

    /// Get a run by ID.
    fn get(&self, id: &str) -> Result<Option<Run>, StoreError>;

    /// Persist status, steps, counters, error and timestamps of a run.
    fn save_progress(&self, run: &Run) -> Result<(), StoreError>;

    /// Flag a running run for cancellation.
    ///
    /// Returns false when the run is missing or already terminal.
    fn request_cancel(&self, id: &str) -> Result<bool, StoreError>;

    /// Read the cancellation flag of a run.
    fn is_cancel_requested(&self, id: &str) -> Result<bool, StoreError>;

    /// Most recently created run for a source.
    fn latest_for_source(&self, source_id: &str) -> Result<Option<Run>, StoreError>;

    /// Whether the source has a run that has not reached a terminal status.
    fn has_running(&self, source_id: &str) -> Result<bool, StoreError>;

    /// List the most recent runs of a source, newest first.
    fn list_for_source(&self, source_id: &str, limit: i64) -> Result<Vec<Run>, StoreError>;

    /// Fail every `RUNNING` run whose last activity is older than the cutoff.
    ///
    /// Returns the runs as they were failed.
    fn fail_stale(&self, cutoff: DateTime<Utc>, reason: &str) -> Result<Vec<Run>, StoreError>;

    /// Delete terminal runs that finished before the cutoff. Returns the number deleted.
    fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}
