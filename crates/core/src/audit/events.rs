use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::run::RunCounters;

/// Event type of the marker written after every retention purge.
pub const RETENTION_PURGE_COMPLETED: &str = "retention_purge_completed";

/// Audit event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Run lifecycle
    RunQueued {
        run_id: String,
        source_id: String,
        /// "scheduled" or "manual"
        trigger: String,
    },
    RunStarted {
        run_id: String,
        source_id: String,
    },
    RunCancelRequested {
        run_id: String,
        requested_by: String,
    },
    RunFinished {
        run_id: String,
        source_id: String,
        /// Terminal status ("SUCCEEDED", "FAILED", "CANCELED")
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        counters: RunCounters,
        duration_ms: u64,
    },

    // Step retries
    StepRetried {
        run_id: String,
        step: String,
        /// Attempts made so far
        attempt: u32,
        error: String,
        /// Backoff before the next attempt
        delay_ms: u64,
    },
    StepFailed {
        run_id: String,
        step: String,
        attempts: u32,
        error: String,
    },

    // Ticket lifecycle
    TicketCreated {
        ticket_id: String,
        run_id: String,
        revision_id: String,
        risk_level: String,
        due_at: DateTime<Utc>,
    },
    TicketEscalated {
        ticket_id: String,
        from_level: String,
        to_level: String,
    },
    TicketMarkedOverdue {
        ticket_id: String,
        due_at: DateTime<Utc>,
    },

    // Scheduler
    SchedulerJobFailed {
        job: String,
        error: String,
    },
    /// Written synchronously at the end of every purge; the latest one
    /// throttles the next purge.
    RetentionPurgeCompleted {
        retention_days: u32,
        audit_deleted: usize,
        runs_deleted: usize,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::RunQueued { .. } => "run_queued",
            Self::RunStarted { .. } => "run_started",
            Self::RunCancelRequested { .. } => "run_cancel_requested",
            Self::RunFinished { .. } => "run_finished",
            Self::StepRetried { .. } => "step_retried",
            Self::StepFailed { .. } => "step_failed",
            Self::TicketCreated { .. } => "ticket_created",
            Self::TicketEscalated { .. } => "ticket_escalated",
            Self::TicketMarkedOverdue { .. } => "ticket_marked_overdue",
            Self::SchedulerJobFailed { .. } => "scheduler_job_failed",
            Self::RetentionPurgeCompleted { .. } => RETENTION_PURGE_COMPLETED,
        }
    }

    /// Returns the run ID if this event relates to a run
    pub fn run_id(&self) -> Option<&str> {
        match self {
            Self::RunQueued { run_id, .. }
            | Self::RunStarted { run_id, .. }
            | Self::RunCancelRequested { run_id, .. }
            | Self::RunFinished { run_id, .. }
            | Self::StepRetried { run_id, .. }
            | Self::StepFailed { run_id, .. }
            | Self::TicketCreated { run_id, .. } => Some(run_id),
            _ => None,
        }
    }

    /// Returns the ticket ID if this event relates to a ticket
    pub fn ticket_id(&self) -> Option<&str> {
        match self {
            Self::TicketCreated { ticket_id, .. }
            | Self::TicketEscalated { ticket_id, .. }
            | Self::TicketMarkedOverdue { ticket_id, .. } => Some(ticket_id),
            _ => None,
        }
    }
}

/// Stored audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub run_id: Option<String>,
    pub ticket_id: Option<String>,
    pub data: AuditEvent,
}

impl AuditRecord {
    /// Build a record for an event, leaving the ID to the store.
    pub fn from_event(timestamp: DateTime<Utc>, event: AuditEvent) -> Self {
        Self {
            id: 0,
            timestamp,
            event_type: event.event_type().to_string(),
            run_id: event.run_id().map(String::from),
            ticket_id: event.ticket_id().map(String::from),
            data: event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_service_started() {
        let event = AuditEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc123".to_string(),
        };
        assert_eq!(event.event_type(), "service_started");
        assert_eq!(event.run_id(), None);
        assert_eq!(event.ticket_id(), None);
    }

    #[test]
    fn test_run_events_carry_run_id() {
        let event = AuditEvent::StepRetried {
            run_id: "run-1".to_string(),
            step: "fetch".to_string(),
            attempt: 1,
            error: "timeout".to_string(),
            delay_ms: 1200,
        };
        assert_eq!(event.event_type(), "step_retried");
        assert_eq!(event.run_id(), Some("run-1"));
        assert_eq!(event.ticket_id(), None);
    }

    #[test]
    fn test_ticket_created_has_both_ids() {
        let event = AuditEvent::TicketCreated {
            ticket_id: "t-1".to_string(),
            run_id: "run-1".to_string(),
            revision_id: "rev-1".to_string(),
            risk_level: "HIGH".to_string(),
            due_at: Utc::now(),
        };
        assert_eq!(event.run_id(), Some("run-1"));
        assert_eq!(event.ticket_id(), Some("t-1"));
    }

    #[test]
    fn test_serialization_is_tagged() {
        let event = AuditEvent::RetentionPurgeCompleted {
            retention_days: 90,
            audit_deleted: 3,
            runs_deleted: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"retention_purge_completed\""));

        let parsed: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_record_from_event() {
        let record = AuditRecord::from_event(
            Utc::now(),
            AuditEvent::TicketEscalated {
                ticket_id: "t-9".to_string(),
                from_level: "LOCAL".to_string(),
                to_level: "REGIONAL".to_string(),
            },
        );
        assert_eq!(record.event_type, "ticket_escalated");
        assert_eq!(record.ticket_id.as_deref(), Some("t-9"));
        assert_eq!(record.run_id, None);
    }
}
