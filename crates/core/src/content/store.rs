//! Content storage trait.

use crate::db::StoreError;

use super::{ContentItem, NormalizedItem, Revision, StoredRevision};

/// Trait for content storage backends.
pub trait ContentStore: Send + Sync {
    /// Upsert the item by `(source_id, external_id)` and append a revision
    /// when the item has none or its content key changed.
    ///
    /// Storing the same item twice within one run converges: the second call
    /// reports the revision and item created by the first one.
    fn store_revision(
        &self,
        source_id: &str,
        run_id: &str,
        item: &NormalizedItem,
    ) -> Result<StoredRevision, StoreError>;

    /// Get an item by source and external ID.
    fn find_item(&self, source_id: &str, external_id: &str)
        -> Result<Option<ContentItem>, StoreError>;

    /// Get a revision by ID.
    fn get_revision(&self, id: &str) -> Result<Option<Revision>, StoreError>;

    /// List an item's revisions, oldest first.
    fn list_revisions(&self, item_id: &str) -> Result<Vec<Revision>, StoreError>;
}
