//! Runtime settings shared by the pipeline and the scheduler jobs.

mod provider;
mod sqlite_store;
mod types;

pub use provider::{SettingsError, SettingsProvider, StaticSettings};
pub use sqlite_store::SqliteSettingsStore;
pub use types::{Settings, SlaHours};
