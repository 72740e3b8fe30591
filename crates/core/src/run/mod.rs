//! Pipeline runs and their embedded step records.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteRunStore;
pub use store::RunStore;
pub use types::{
    PipelineStep, Run, ABANDONED, RunCounters, RunStatus, RunTrigger, StepRecord, StepStatus,
    STEP_COUNT,
};
