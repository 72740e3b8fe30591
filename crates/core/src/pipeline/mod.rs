//! Ingestion pipeline.
//!
//! A run executes the eight [`PipelineStep`](crate::run::PipelineStep)s of
//! one source in order. The [`PipelineRunner`] owns the step records: it
//! retries each failing step with exponential backoff, checks the run's
//! cancel flag between steps and writes every transition to the run store.
//! Steps only read and fill the [`PipelineContext`].

mod backoff;
mod context;
mod queue;
mod runner;
mod steps;
mod types;

pub use backoff::{backoff_delay, RetryPolicy, MAX_JITTER};
pub use context::{AnalyzedRevision, PipelineContext};
pub use queue::{QueueError, RunDispatcher, RunQueue, RunWorker};
pub use runner::PipelineRunner;
pub use steps::PipelineSteps;
pub use types::{PipelineDeps, PipelineError, RunJob, StepError};
