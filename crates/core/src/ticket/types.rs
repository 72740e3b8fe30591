//! Ticket types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::Severity;

/// Workflow status of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Open => "OPEN",
            TicketStatus::InProgress => "IN_PROGRESS",
            TicketStatus::Resolved => "RESOLVED",
            TicketStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OPEN" => Some(TicketStatus::Open),
            "IN_PROGRESS" => Some(TicketStatus::InProgress),
            "RESOLVED" => Some(TicketStatus::Resolved),
            "CLOSED" => Some(TicketStatus::Closed),
            _ => None,
        }
    }

    /// Whether the ticket still needs work.
    pub fn is_open(self) -> bool {
        matches!(self, TicketStatus::Open | TicketStatus::InProgress)
    }
}

/// Organizational tier responsible for a ticket, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationLevel {
    Local,
    Regional,
    Global,
}

impl EscalationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            EscalationLevel::Local => "LOCAL",
            EscalationLevel::Regional => "REGIONAL",
            EscalationLevel::Global => "GLOBAL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "LOCAL" => Some(EscalationLevel::Local),
            "REGIONAL" => Some(EscalationLevel::Regional),
            "GLOBAL" => Some(EscalationLevel::Global),
            _ => None,
        }
    }

    /// The next tier up, or `None` at the top.
    pub fn next(self) -> Option<Self> {
        match self {
            EscalationLevel::Local => Some(EscalationLevel::Regional),
            EscalationLevel::Regional => Some(EscalationLevel::Global),
            EscalationLevel::Global => None,
        }
    }
}

/// A remediation ticket for one analyzed revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    /// `revision:<revision_id>`; at most one ticket per key.
    pub idempotency_key: String,
    pub revision_id: String,
    pub content_item_id: String,
    pub source_id: String,
    pub analysis_id: String,
    pub title: String,
    pub status: TicketStatus,
    pub risk_level: Severity,
    pub escalation_level: EscalationLevel,
    pub due_at: DateTime<Utc>,
    pub overdue: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Idempotency key of the ticket for a revision.
    pub fn key_for_revision(revision_id: &str) -> String {
        format!("revision:{}", revision_id)
    }
}

/// Kind of ticket lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketEventKind {
    Created,
    Escalated,
    MarkedOverdue,
}

impl TicketEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketEventKind::Created => "CREATED",
            TicketEventKind::Escalated => "ESCALATED",
            TicketEventKind::MarkedOverdue => "MARKED_OVERDUE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREATED" => Some(TicketEventKind::Created),
            "ESCALATED" => Some(TicketEventKind::Escalated),
            "MARKED_OVERDUE" => Some(TicketEventKind::MarkedOverdue),
            _ => None,
        }
    }
}

/// An entry in a ticket's lifecycle history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketEvent {
    pub id: String,
    pub ticket_id: String,
    pub kind: TicketEventKind,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_ladder() {
        assert_eq!(EscalationLevel::Local.next(), Some(EscalationLevel::Regional));
        assert_eq!(EscalationLevel::Regional.next(), Some(EscalationLevel::Global));
        assert_eq!(EscalationLevel::Global.next(), None);
        assert!(EscalationLevel::Local < EscalationLevel::Global);
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            TicketStatus::Open,
            TicketStatus::InProgress,
            TicketStatus::Resolved,
            TicketStatus::Closed,
        ] {
            assert_eq!(TicketStatus::parse(status.as_str()), Some(status));
        }
        assert!(TicketStatus::InProgress.is_open());
        assert!(!TicketStatus::Resolved.is_open());
    }

    #[test]
    fn test_key_for_revision() {
        assert_eq!(Ticket::key_for_revision("abc"), "revision:abc");
    }
}
