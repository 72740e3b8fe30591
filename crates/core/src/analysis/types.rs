//! Analysis data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a rule or violation, lowest first.
///
/// Also used as the risk level of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "LOW" => Some(Severity::Low),
            "MEDIUM" => Some(Severity::Medium),
            "HIGH" => Some(Severity::High),
            "CRITICAL" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// Compliance verdict of one revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
    Uncertain,
}

impl ComplianceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "COMPLIANT",
            ComplianceStatus::NonCompliant => "NON_COMPLIANT",
            ComplianceStatus::Uncertain => "UNCERTAIN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "COMPLIANT" => Some(ComplianceStatus::Compliant),
            "NON_COMPLIANT" => Some(ComplianceStatus::NonCompliant),
            "UNCERTAIN" => Some(ComplianceStatus::Uncertain),
            _ => None,
        }
    }

    /// Whether a result with this status needs a remediation ticket.
    pub fn needs_ticket(self) -> bool {
        !matches!(self, ComplianceStatus::Compliant)
    }
}

/// An active compliance rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceRule {
    pub id: String,
    /// Identifies the exact wording of the rule at analysis time.
    pub version_id: String,
    pub channel: String,
    /// Country the rule applies to; `None` applies everywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub active: bool,
}

impl ComplianceRule {
    pub fn snapshot(&self) -> RuleSnapshot {
        RuleSnapshot {
            rule_id: self.id.clone(),
            rule_version_id: self.version_id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            severity: self.severity,
        }
    }
}

/// Rule content sent to the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSnapshot {
    pub rule_id: String,
    pub rule_version_id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

/// One rule violation found in a revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub rule_version_id: String,
    pub rule_id: String,
    pub severity_snapshot: Severity,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_suggestion: Option<String>,
}

/// Content submitted for analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: String,
    pub url: String,
    pub rules: Vec<RuleSnapshot>,
    /// The text was PII-redacted before submission.
    pub redacted: bool,
}

/// Structured verdict returned by the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisVerdict {
    pub compliance_status: ComplianceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub violations: Vec<Violation>,
}

/// Stored analysis of one revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: String,
    pub revision_id: String,
    pub status: ComplianceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub violations: Vec<Violation>,
    /// Why the verdict was reached without the analyzer, or why it degraded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Highest severity among the violations.
    pub fn highest_severity(&self) -> Option<Severity> {
        self.violations.iter().map(|v| v.severity_snapshot).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(severity: Severity) -> Violation {
        Violation {
            rule_version_id: "rv-1".to_string(),
            rule_id: "r-1".to_string(),
            severity_snapshot: severity,
            evidence: vec!["guaranteed returns".to_string()],
            explanation: "misleading claim".to_string(),
            fix_suggestion: None,
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_highest_severity() {
        let mut result = AnalysisResult {
            id: "a".to_string(),
            revision_id: "rev".to_string(),
            status: ComplianceStatus::NonCompliant,
            language: None,
            confidence: None,
            violations: vec![],
            reason: None,
            created_at: Utc::now(),
        };
        assert_eq!(result.highest_severity(), None);

        result.violations = vec![
            violation(Severity::Medium),
            violation(Severity::Critical),
            violation(Severity::Low),
        ];
        assert_eq!(result.highest_severity(), Some(Severity::Critical));
    }

    #[test]
    fn test_verdict_wire_format() {
        let json = r#"{
            "complianceStatus": "NON_COMPLIANT",
            "language": "en",
            "confidence": 0.9,
            "violations": [{
                "ruleVersionId": "rv-1",
                "ruleId": "r-1",
                "severitySnapshot": "HIGH",
                "evidence": ["risk-free"],
                "explanation": "claims no risk",
                "fixSuggestion": "remove the claim"
            }]
        }"#;
        let verdict: AnalysisVerdict = serde_json::from_str(json).unwrap();
        assert_eq!(verdict.compliance_status, ComplianceStatus::NonCompliant);
        assert_eq!(verdict.violations[0].severity_snapshot, Severity::High);
        assert_eq!(
            verdict.violations[0].fix_suggestion.as_deref(),
            Some("remove the claim")
        );
    }

    #[test]
    fn test_needs_ticket() {
        assert!(!ComplianceStatus::Compliant.needs_ticket());
        assert!(ComplianceStatus::NonCompliant.needs_ticket());
        assert!(ComplianceStatus::Uncertain.needs_ticket());
    }
}
