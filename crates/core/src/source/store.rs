//! Source storage trait.

use crate::db::StoreError;

use super::{FetchParams, Source};

/// Request to register a new source.
#[derive(Debug, Clone)]
pub struct CreateSourceRequest {
    pub name: String,
    pub channel: String,
    pub country: String,
    pub fetch: FetchParams,
    pub enabled: bool,
    pub crawl_interval_minutes: Option<u32>,
    pub redact_pii: Option<bool>,
}

/// Trait for source storage backends.
pub trait SourceStore: Send + Sync {
    /// Register a source.
    fn create(&self, request: CreateSourceRequest) -> Result<Source, StoreError>;

    /// Get a source by ID.
    fn get(&self, id: &str) -> Result<Option<Source>, StoreError>;

    /// List all enabled sources.
    fn list_enabled(&self) -> Result<Vec<Source>, StoreError>;
}
