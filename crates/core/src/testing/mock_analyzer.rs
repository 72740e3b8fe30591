//! Mock compliance analyzer for testing.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::analysis::{
    AnalysisRequest, AnalysisVerdict, AnalyzerError, ComplianceAnalyzer, ComplianceStatus,
};

/// Mock implementation of the ComplianceAnalyzer trait.
///
/// Returns the configured verdict (COMPLIANT by default) and records every
/// request for assertions.
#[derive(Debug)]
pub struct MockAnalyzer {
    verdict: Mutex<Result<AnalysisVerdict, String>>,
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl Default for MockAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAnalyzer {
    pub fn new() -> Self {
        Self::with_verdict(AnalysisVerdict {
            compliance_status: ComplianceStatus::Compliant,
            language: Some("en".to_string()),
            confidence: Some(0.9),
            violations: Vec::new(),
        })
    }

    pub fn with_verdict(verdict: AnalysisVerdict) -> Self {
        Self {
            verdict: Mutex::new(Ok(verdict)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// An analyzer whose every request fails.
    pub fn failing(message: &str) -> Self {
        Self {
            verdict: Mutex::new(Err(message.to_string())),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replace the verdict returned by later requests.
    pub fn set_verdict(&self, verdict: AnalysisVerdict) {
        *self.verdict.lock().unwrap_or_else(|e| e.into_inner()) = Ok(verdict);
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ComplianceAnalyzer for MockAnalyzer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisVerdict, AnalyzerError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        self.verdict
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .map_err(AnalyzerError::Request)
    }
}
