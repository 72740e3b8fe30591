//! Content data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw item returned by a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedItem {
    /// Stable identifier of the item within its source.
    pub external_id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: String,
    pub fetched_at: DateTime<Utc>,
}

/// A fetched item after normalization, carrying its content key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub external_id: String,
    /// Canonical form of the item URL.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Normalized text.
    pub text: String,
    /// Hash over normalized text and canonical URL.
    pub content_key: String,
}

/// Durable record of a fetched unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub source_id: String,
    pub external_id: String,
    pub url: String,
    pub current_revision_id: Option<String>,
    /// Run that first created the item.
    pub first_seen_run_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable snapshot of an item's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub id: String,
    pub item_id: String,
    /// Run that created the snapshot.
    pub run_id: String,
    pub content_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of storing one normalized item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRevision {
    pub item_id: String,
    /// The item's current revision after the store.
    pub revision: Revision,
    /// The item was first created by this run.
    pub is_new_item: bool,
    /// The current revision was created by this run.
    pub created_revision: bool,
}

impl StoredRevision {
    /// New items and new revisions both count as changed.
    pub fn is_changed(&self) -> bool {
        self.is_new_item || self.created_revision
    }
}
