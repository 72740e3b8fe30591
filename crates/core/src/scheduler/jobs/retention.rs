//! Retention purge of audit events and finished runs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::audit::{AuditEvent, AuditRecord, AuditStore, RETENTION_PURGE_COMPLETED};
use crate::metrics;
use crate::run::RunStore;
use crate::scheduler::{JobError, JobLock, ScheduledJob};
use crate::settings::SettingsProvider;

/// Minimum time between two purges.
pub const PURGE_INTERVAL_HOURS: i64 = 24;

/// Deletes audit events and terminal runs older than the retention window.
///
/// At most one purge happens per [`PURGE_INTERVAL_HOURS`]: every purge
/// writes a completion marker straight to the audit store, and the next
/// invocation does nothing while the latest marker is younger than that.
/// Tickets and content are never purged.
pub struct RetentionPurgeJob {
    audit_store: Arc<dyn AuditStore>,
    runs: Arc<dyn RunStore>,
    settings: Arc<dyn SettingsProvider>,
}

impl RetentionPurgeJob {
    pub fn new(
        audit_store: Arc<dyn AuditStore>,
        runs: Arc<dyn RunStore>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self {
            audit_store,
            runs,
            settings,
        }
    }
}

#[async_trait]
impl ScheduledJob for RetentionPurgeJob {
    fn lock(&self) -> JobLock {
        JobLock::RetentionPurge
    }

    async fn run(&self) -> Result<(), JobError> {
        let now = Utc::now();

        if let Some(marker) = self.audit_store.latest_of_type(RETENTION_PURGE_COMPLETED)? {
            if now - marker.timestamp < Duration::hours(PURGE_INTERVAL_HOURS) {
                debug!(last_purge = %marker.timestamp, "Retention purge ran recently, skipping");
                return Ok(());
            }
        }

        let settings = self.settings.current()?;
        let cutoff = now - Duration::days(settings.retention_days as i64);

        let audit_deleted = self.audit_store.delete_before(cutoff)?;
        let runs_deleted = self.runs.delete_finished_before(cutoff)?;
        metrics::RETENTION_DELETED
            .with_label_values(&["audit_events"])
            .inc_by(audit_deleted as u64);
        metrics::RETENTION_DELETED
            .with_label_values(&["runs"])
            .inc_by(runs_deleted as u64);

        // Written synchronously: the marker must be visible to the next tick
        // of any worker.
        self.audit_store.insert(&AuditRecord::from_event(
            now,
            AuditEvent::RetentionPurgeCompleted {
                retention_days: settings.retention_days,
                audit_deleted,
                runs_deleted,
            },
        ))?;

        info!(
            retention_days = settings.retention_days,
            audit_deleted, runs_deleted, "Retention purge complete"
        );
        Ok(())
    }
}
