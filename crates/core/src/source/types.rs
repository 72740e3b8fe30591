//! Source data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parameters the connector needs to fetch a source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchParams {
    /// Pages to fetch, one content item per URL.
    #[serde(default)]
    pub urls: Vec<String>,
}

/// A configured origin of content.
///
/// Sources are read-only inputs to the pipeline: a run never mutates the
/// source it ingests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    /// Channel name, used to pick the connector and scope compliance rules.
    pub channel: String,
    /// Country code used to scope compliance rules.
    pub country: String,
    pub fetch: FetchParams,
    pub enabled: bool,
    /// Crawl interval override; the settings default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_interval_minutes: Option<u32>,
    /// PII redaction override; the settings default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact_pii: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl Source {
    /// Effective crawl interval given the settings default.
    pub fn crawl_interval_minutes_or(&self, default_minutes: u32) -> u32 {
        self.crawl_interval_minutes.unwrap_or(default_minutes)
    }

    /// Whether content from this source is redacted before analysis.
    pub fn redacts_pii(&self, default: bool) -> bool {
        self.redact_pii.unwrap_or(default)
    }
}
