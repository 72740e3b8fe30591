//! The scheduler's maintenance jobs.

mod escalation;
mod ingestion;
mod retention;

pub use escalation::EscalationSweepJob;
pub use ingestion::IngestionScanJob;
pub use retention::{RetentionPurgeJob, PURGE_INTERVAL_HOURS};
