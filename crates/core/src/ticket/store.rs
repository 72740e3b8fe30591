//! Ticket storage trait and types.

use chrono::{DateTime, Utc};

use crate::analysis::Severity;
use crate::db::StoreError;

use super::{EscalationLevel, Ticket, TicketEvent, TicketStatus};

/// Ticket to be created for an analyzed revision.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub idempotency_key: String,
    pub revision_id: String,
    pub content_item_id: String,
    pub source_id: String,
    pub analysis_id: String,
    pub title: String,
    pub risk_level: Severity,
    pub due_at: DateTime<Utc>,
}

/// Filter for querying tickets.
#[derive(Debug, Clone)]
pub struct TicketFilter {
    /// Filter by status.
    pub status: Option<TicketStatus>,
    /// Filter by escalation level.
    pub escalation_level: Option<EscalationLevel>,
    /// Filter by source.
    pub source_id: Option<String>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl Default for TicketFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            status: None,
            escalation_level: None,
            source_id: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: TicketStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_escalation_level(mut self, level: EscalationLevel) -> Self {
        self.escalation_level = Some(level);
        self
    }

    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// Trait for ticket storage backends.
pub trait TicketStore: Send + Sync {
    /// Create the ticket and its CREATED event unless a ticket with the same
    /// idempotency key exists.
    ///
    /// Returns `None` when the key was already taken.
    fn create_if_absent(&self, ticket: NewTicket) -> Result<Option<Ticket>, StoreError>;

    /// Get a ticket by ID.
    fn get(&self, id: &str) -> Result<Option<Ticket>, StoreError>;

    /// Get a ticket by idempotency key.
    fn find_by_key(&self, idempotency_key: &str) -> Result<Option<Ticket>, StoreError>;

    /// List tickets matching the filter, oldest first.
    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError>;

    /// Count tickets matching the filter.
    fn count(&self, filter: &TicketFilter) -> Result<i64, StoreError>;

    /// Lifecycle events of a ticket, oldest first.
    fn list_events(&self, ticket_id: &str) -> Result<Vec<TicketEvent>, StoreError>;

    /// Change a ticket's workflow status.
    fn update_status(&self, id: &str, status: TicketStatus) -> Result<Ticket, StoreError>;

    /// Open tickets below GLOBAL not updated since `cutoff`.
    fn escalation_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<Ticket>, StoreError>;

    /// Move a ticket up exactly one tier from `from`, recording an ESCALATED
    /// event and touching `updated_at`.
    ///
    /// Returns `None` when the ticket is no longer open or no longer at
    /// `from` (another sweep got there first).
    fn escalate(
        &self,
        id: &str,
        from: EscalationLevel,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError>;

    /// Open tickets past their due date that are not flagged overdue.
    fn overdue_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Ticket>, StoreError>;

    /// Flag a ticket overdue and record a MARKED_OVERDUE event.
    ///
    /// Returns `false` if it was already flagged.
    fn mark_overdue(&self, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;
}
