//! Remediation tickets opened for non-compliant content.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteTicketStore;
pub use store::{NewTicket, TicketFilter, TicketStore};
pub use types::{EscalationLevel, Ticket, TicketEvent, TicketEventKind, TicketStatus};
