//! Append-only audit trail of run, ticket and scheduler activity.
//!
//! Events are emitted through an [`AuditHandle`] and written by a single
//! [`AuditWriter`] task. The retention purge bypasses the channel and writes
//! its completion marker straight to the [`AuditStore`].

mod events;
mod handle;
mod sqlite;
mod store;
mod writer;

pub use events::*;
pub use handle::*;
pub use sqlite::*;
pub use store::*;
pub use writer::*;
