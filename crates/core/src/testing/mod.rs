//! Testing utilities and mock implementations.
//!
//! This module provides mocks for the external collaborators of the pipeline
//! (connectors, language models, analyzers) and an in-memory store bundle,
//! allowing end-to-end runs without network or disk.
//!
//! # Example
//!
//! ```rust,ignore
//! use compliance_watch_core::testing::{fixtures, MockAnalyzer, MockConnector, TestStores};
//!
//! let stores = TestStores::new()?;
//! let connector = Arc::new(MockConnector::with_items(vec![
//!     fixtures::fetched_item("https://example.com/offer", "Earn 5% interest"),
//! ]));
//! let runner = PipelineRunner::new(stores.deps(connector, Some(Arc::new(MockAnalyzer::new()))));
//! ```

mod mock_analyzer;
mod mock_connector;
mod mock_llm;

pub use mock_analyzer::MockAnalyzer;
pub use mock_connector::MockConnector;
pub use mock_llm::MockLlmClient;

use std::sync::Arc;

use crate::analysis::{ComplianceAnalyzer, SqliteAnalysisStore, SqliteRuleStore};
use crate::connector::{Connector, ConnectorRegistry};
use crate::content::SqliteContentStore;
use crate::db::StoreError;
use crate::pipeline::PipelineDeps;
use crate::run::SqliteRunStore;
use crate::settings::StaticSettings;
use crate::source::SqliteSourceStore;
use crate::ticket::SqliteTicketStore;

/// In-memory instances of every store the pipeline uses.
pub struct TestStores {
    pub sources: Arc<SqliteSourceStore>,
    pub runs: Arc<SqliteRunStore>,
    pub content: Arc<SqliteContentStore>,
    pub rules: Arc<SqliteRuleStore>,
    pub analyses: Arc<SqliteAnalysisStore>,
    pub tickets: Arc<SqliteTicketStore>,
    pub settings: Arc<StaticSettings>,
}

impl TestStores {
    /// Fresh stores with [`fixtures::fast_settings`].
    pub fn new() -> Result<Self, StoreError> {
        Ok(Self {
            sources: Arc::new(SqliteSourceStore::in_memory()?),
            runs: Arc::new(SqliteRunStore::in_memory()?),
            content: Arc::new(SqliteContentStore::in_memory()?),
            rules: Arc::new(SqliteRuleStore::in_memory()?),
            analyses: Arc::new(SqliteAnalysisStore::in_memory()?),
            tickets: Arc::new(SqliteTicketStore::in_memory()?),
            settings: Arc::new(StaticSettings::new(fixtures::fast_settings())),
        })
    }

    /// Pipeline collaborators with `connector` registered for the "web" channel.
    pub fn deps(
        &self,
        connector: Arc<dyn Connector>,
        analyzer: Option<Arc<dyn ComplianceAnalyzer>>,
    ) -> PipelineDeps {
        PipelineDeps {
            sources: self.sources.clone(),
            runs: self.runs.clone(),
            content: self.content.clone(),
            rules: self.rules.clone(),
            analyses: self.analyses.clone(),
            tickets: self.tickets.clone(),
            connectors: ConnectorRegistry::new().with("web", connector),
            analyzer,
            settings: self.settings.clone(),
            audit: None,
        }
    }
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;

    use crate::analysis::{
        AnalysisVerdict, ComplianceRule, ComplianceStatus, CreateRuleRequest, Severity, Violation,
    };
    use crate::content::FetchedItem;
    use crate::settings::Settings;
    use crate::source::{CreateSourceRequest, FetchParams};

    /// Default settings with a 1 ms retry base so failing steps retry quickly.
    pub fn fast_settings() -> Settings {
        Settings {
            step_base_delay_ms: 1,
            ..Settings::default()
        }
    }

    /// A fetched item keyed by its URL.
    pub fn fetched_item(url: &str, text: &str) -> FetchedItem {
        FetchedItem {
            external_id: crate::content::canonical_url(url),
            url: url.to_string(),
            title: Some(format!("Page {}", url)),
            text: text.to_string(),
            fetched_at: Utc::now(),
        }
    }

    /// An enabled web source for Germany.
    pub fn source_request(name: &str, urls: &[&str]) -> CreateSourceRequest {
        CreateSourceRequest {
            name: name.to_string(),
            channel: "web".to_string(),
            country: "DE".to_string(),
            fetch: FetchParams {
                urls: urls.iter().map(|u| u.to_string()).collect(),
            },
            enabled: true,
            crawl_interval_minutes: None,
            redact_pii: None,
        }
    }

    /// A web rule that applies to every country.
    pub fn rule_request(title: &str, severity: Severity) -> CreateRuleRequest {
        CreateRuleRequest {
            channel: "web".to_string(),
            country: None,
            title: title.to_string(),
            description: format!("Content must respect: {}", title),
            severity,
        }
    }

    /// A violation of `rule` quoting `evidence`.
    pub fn violation(rule: &ComplianceRule, evidence: &str) -> Violation {
        Violation {
            rule_version_id: rule.version_id.clone(),
            rule_id: rule.id.clone(),
            severity_snapshot: rule.severity,
            evidence: vec![evidence.to_string()],
            explanation: format!("violates {}", rule.title),
            fix_suggestion: None,
        }
    }

    /// A NON_COMPLIANT verdict with one violation per rule.
    pub fn non_compliant(rules: &[&ComplianceRule]) -> AnalysisVerdict {
        AnalysisVerdict {
            compliance_status: ComplianceStatus::NonCompliant,
            language: Some("en".to_string()),
            confidence: Some(0.85),
            violations: rules.iter().map(|r| violation(r, "guaranteed")).collect(),
        }
    }
}
