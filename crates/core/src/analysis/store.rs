//! Rule and analysis storage traits.

use crate::db::StoreError;

use super::{AnalysisResult, ComplianceRule, ComplianceStatus, Severity, Violation};

/// Request to register a compliance rule.
#[derive(Debug, Clone)]
pub struct CreateRuleRequest {
    pub channel: String,
    pub country: Option<String>,
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

/// Trait for compliance rule storage backends.
pub trait RuleStore: Send + Sync {
    /// Register an active rule with a fresh version ID.
    fn create_rule(&self, request: CreateRuleRequest) -> Result<ComplianceRule, StoreError>;

    /// Active rules for a channel that apply to the given country.
    ///
    /// Rules without a country apply everywhere.
    fn active_rules(&self, channel: &str, country: &str) -> Result<Vec<ComplianceRule>, StoreError>;

    /// Stop applying a rule to future analyses.
    fn deactivate(&self, id: &str) -> Result<(), StoreError>;
}

/// Analysis to be stored for a revision.
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub revision_id: String,
    pub status: ComplianceStatus,
    pub language: Option<String>,
    pub confidence: Option<f32>,
    pub violations: Vec<Violation>,
    pub reason: Option<String>,
}

impl NewAnalysis {
    /// An UNCERTAIN analysis carrying the reason no verdict was reached.
    pub fn uncertain(revision_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            revision_id: revision_id.into(),
            status: ComplianceStatus::Uncertain,
            language: None,
            confidence: None,
            violations: Vec::new(),
            reason: Some(reason.into()),
        }
    }
}

/// Trait for analysis result storage backends.
pub trait AnalysisStore: Send + Sync {
    /// Store the analysis unless the revision already has one.
    ///
    /// Returns the stored analysis, which is the existing one if present.
    fn insert_if_absent(&self, analysis: NewAnalysis) -> Result<AnalysisResult, StoreError>;

    /// Get the analysis of a revision.
    fn get_for_revision(&self, revision_id: &str) -> Result<Option<AnalysisResult>, StoreError>;
}
