//! Escalation sweep over open tickets.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics;
use crate::scheduler::{JobError, JobLock, ScheduledJob};
use crate::settings::SettingsProvider;
use crate::ticket::TicketStore;

/// Escalates stale tickets one tier and flags tickets past their due date.
///
/// Both passes are idempotent: an escalation touches `updated_at`, so the
/// ticket is not stale again until another threshold passes, and overdue
/// tickets are never flagged twice.
pub struct EscalationSweepJob {
    tickets: Arc<dyn TicketStore>,
    settings: Arc<dyn SettingsProvider>,
    audit: Option<AuditHandle>,
}

impl EscalationSweepJob {
    pub fn new(tickets: Arc<dyn TicketStore>, settings: Arc<dyn SettingsProvider>) -> Self {
        Self {
            tickets,
            settings,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    async fn escalate_stale(&self, threshold_hours: u32) -> Result<usize, JobError> {
        let now = Utc::now();
        let cutoff = now - Duration::hours(threshold_hours as i64);
        let mut escalated = 0;

        for ticket in self.tickets.escalation_candidates(cutoff)? {
            let from = ticket.escalation_level;
            let Some(updated) = self.tickets.escalate(&ticket.id, from, now)? else {
                debug!(ticket_id = %ticket.id, "Ticket changed since it was selected");
                continue;
            };

            let to = updated.escalation_level;
            info!(ticket_id = %ticket.id, from = from.as_str(), to = to.as_str(), "Ticket escalated");
            metrics::TICKETS_ESCALATED
                .with_label_values(&[to.as_str()])
                .inc();
            if let Some(audit) = &self.audit {
                audit
                    .emit(AuditEvent::TicketEscalated {
                        ticket_id: ticket.id.clone(),
                        from_level: from.as_str().to_string(),
                        to_level: to.as_str().to_string(),
                    })
                    .await;
            }
            escalated += 1;
        }
        Ok(escalated)
    }

    async fn flag_overdue(&self) -> Result<usize, JobError> {
        let now = Utc::now();
        let mut flagged = 0;

        for ticket in self.tickets.overdue_candidates(now)? {
            if !self.tickets.mark_overdue(&ticket.id, now)? {
                continue;
            }

            info!(ticket_id = %ticket.id, due_at = %ticket.due_at, "Ticket overdue");
            metrics::TICKETS_OVERDUE.inc();
            if let Some(audit) = &self.audit {
                audit
                    .emit(AuditEvent::TicketMarkedOverdue {
                        ticket_id: ticket.id.clone(),
                        due_at: ticket.due_at,
                    })
                    .await;
            }
            flagged += 1;
        }
        Ok(flagged)
    }
}

#[async_trait]
impl ScheduledJob for EscalationSweepJob {
    fn lock(&self) -> JobLock {
        JobLock::EscalationScan
    }

    async fn run(&self) -> Result<(), JobError> {
        let settings = self.settings.current()?;
        let escalated = self.escalate_stale(settings.escalation_threshold_hours).await?;
        let overdue = self.flag_overdue().await?;

        if escalated + overdue > 0 {
            info!(escalated, overdue, "Escalation sweep complete");
        } else {
            debug!("Escalation sweep found nothing to do");
        }
        Ok(())
    }
}
