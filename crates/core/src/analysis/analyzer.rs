//! Compliance analyzer trait and the LLM-backed implementation.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::metrics;

use super::llm::{CompletionRequest, LlmClient};
use super::types::{AnalysisRequest, AnalysisVerdict};

/// Errors that can occur while analyzing one revision.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// The backing model could not be reached or returned an error.
    #[error("Analyzer request failed: {0}")]
    Request(String),

    /// The response was not a valid verdict.
    #[error("Malformed analyzer response: {0}")]
    MalformedResponse(String),
}

/// Judges a piece of content against a set of compliance rules.
#[async_trait]
pub trait ComplianceAnalyzer: Send + Sync {
    /// Name of this analyzer, for logging.
    fn name(&self) -> &str;

    /// Produce a verdict for the request.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisVerdict, AnalyzerError>;
}

const SYSTEM_PROMPT: &str = r#"You are a marketing compliance reviewer. You receive a piece of published content and a list of compliance rules. Decide whether the content violates any of the rules.

Only report violations of the rules you were given, and copy their ruleId, ruleVersionId and severity exactly. Quote the offending passages as evidence. If you cannot reach a confident decision, answer UNCERTAIN.

Respond with JSON only:
{
  "complianceStatus": "COMPLIANT" | "NON_COMPLIANT" | "UNCERTAIN",
  "language": "en",
  "confidence": 0.0 to 1.0,
  "violations": [
    {
      "ruleVersionId": "...",
      "ruleId": "...",
      "severitySnapshot": "LOW" | "MEDIUM" | "HIGH" | "CRITICAL",
      "evidence": ["quoted passage"],
      "explanation": "why this violates the rule",
      "fixSuggestion": "how to fix it"
    }
  ]
}"#;

/// Analyzer that asks a language model for a verdict.
pub struct LlmAnalyzer {
    client: Arc<dyn LlmClient>,
    max_tokens: u32,
}

impl LlmAnalyzer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            max_tokens: 2048,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_user_prompt(request: &AnalysisRequest) -> Result<String, AnalyzerError> {
        let payload = serde_json::to_string_pretty(request)
            .map_err(|e| AnalyzerError::Request(e.to_string()))?;
        Ok(format!(
            "Review the following content against the listed rules.\n\n{}",
            payload
        ))
    }
}

#[async_trait]
impl ComplianceAnalyzer for LlmAnalyzer {
    fn name(&self) -> &str {
        "llm"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisVerdict, AnalyzerError> {
        let completion = CompletionRequest::new(Self::build_user_prompt(request)?)
            .with_system(SYSTEM_PROMPT)
            .with_max_tokens(self.max_tokens);

        let started = Instant::now();
        let result = self.client.complete(completion).await;
        metrics::EXTERNAL_SERVICE_DURATION
            .with_label_values(&["llm"])
            .observe(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => {
                metrics::EXTERNAL_SERVICE_REQUESTS
                    .with_label_values(&["llm", "success"])
                    .inc();
                response
            }
            Err(e) => {
                metrics::EXTERNAL_SERVICE_REQUESTS
                    .with_label_values(&["llm", "error"])
                    .inc();
                return Err(AnalyzerError::Request(e.to_string()));
            }
        };

        let provider = self.client.provider();
        metrics::LLM_TOKENS
            .with_label_values(&[provider, "input"])
            .inc_by(response.usage.input_tokens as u64);
        metrics::LLM_TOKENS
            .with_label_values(&[provider, "output"])
            .inc_by(response.usage.output_tokens as u64);
        debug!(
            provider,
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "LLM analysis completed"
        );

        parse_verdict(&response.text)
    }
}

/// Parse a model response into a verdict.
///
/// Markdown code fences and any prose around the outermost JSON object are
/// ignored. Confidence is clamped to `0.0..=1.0`.
pub fn parse_verdict(text: &str) -> Result<AnalysisVerdict, AnalyzerError> {
    let trimmed = strip_code_fences(text);
    let json_str = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => {
            return Err(AnalyzerError::MalformedResponse(
                "no JSON object in response".to_string(),
            ))
        }
    };

    let mut verdict: AnalysisVerdict = serde_json::from_str(json_str)
        .map_err(|e| AnalyzerError::MalformedResponse(e.to_string()))?;
    verdict.confidence = verdict.confidence.map(|c| c.clamp(0.0, 1.0));
    Ok(verdict)
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening fence
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
