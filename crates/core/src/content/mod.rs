//! Fetched content, change detection and revision history.

mod normalize;
mod sqlite_store;
mod store;
mod types;

pub use normalize::{canonical_url, content_key, normalize_item, normalize_text};
pub use sqlite_store::SqliteContentStore;
pub use store::ContentStore;
pub use types::{ContentItem, FetchedItem, NormalizedItem, Revision, StoredRevision};
