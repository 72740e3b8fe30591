//! Configured content origins.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteSourceStore;
pub use store::{CreateSourceRequest, SourceStore};
pub use types::{FetchParams, Source};
