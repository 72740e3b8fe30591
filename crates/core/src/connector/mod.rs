//! Source connectors.
//!
//! A connector turns a [`Source`](crate::source::Source) into raw
//! [`FetchedItem`](crate::content::FetchedItem)s. Connectors are picked by
//! the source channel through a [`ConnectorRegistry`].

mod registry;
mod web;

pub use registry::ConnectorRegistry;
pub use web::{extract_text, extract_title, WebConnector};

use async_trait::async_trait;
use thiserror::Error;

use crate::content::FetchedItem;
use crate::source::Source;

/// Errors from a connector fetch as a whole.
///
/// Failures of individual items are logged and the item is dropped; only
/// problems that make the whole fetch meaningless surface here.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("source {source_id} is missing fetch configuration: {reason}")]
    MissingConfiguration { source_id: String, reason: String },

    #[error("no connector registered for channel '{0}'")]
    UnsupportedChannel(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl ConnectorError {
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ConnectorError::Timeout
        } else if e.is_connect() {
            ConnectorError::ConnectionFailed(e.to_string())
        } else {
            ConnectorError::Http(e.to_string())
        }
    }
}

/// Fetches raw items for a source.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connector name, used in logs and metrics.
    fn name(&self) -> &str;

    /// Fetch the current items of a source.
    ///
    /// Returns an empty list when the source currently has no reachable
    /// items.
    async fn fetch(&self, source: &Source) -> Result<Vec<FetchedItem>, ConnectorError>;
}
