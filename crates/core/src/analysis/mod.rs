//! Compliance analysis of changed revisions.
//!
//! The analyzer is an opaque text-analysis collaborator: it receives the
//! content of a revision together with snapshots of the rules that apply to
//! it and answers with a structured verdict. Anything it cannot answer
//! cleanly degrades to [`ComplianceStatus::Uncertain`] in the pipeline.

mod analyzer;
mod llm;
mod redact;
mod sqlite_store;
mod store;
mod types;

pub use analyzer::{parse_verdict, AnalyzerError, ComplianceAnalyzer, LlmAnalyzer};
pub use llm::{
    AnthropicClient, CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage,
    OllamaClient,
};
pub use redact::redact_pii;
pub use sqlite_store::{SqliteAnalysisStore, SqliteRuleStore};
pub use store::{AnalysisStore, CreateRuleRequest, NewAnalysis, RuleStore};
pub use types::{
    AnalysisRequest, AnalysisResult, AnalysisVerdict, ComplianceRule, ComplianceStatus,
    RuleSnapshot, Severity, Violation,
};
