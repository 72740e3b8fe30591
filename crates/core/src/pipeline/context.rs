//! Run-scoped state passed between steps.

use chrono::{DateTime, Utc};

use crate::analysis::AnalysisResult;
use crate::content::{FetchedItem, NormalizedItem, StoredRevision};
use crate::run::{Run, RunCounters};
use crate::settings::Settings;
use crate::source::Source;
use crate::ticket::Ticket;

/// An analysis together with the revision it judged.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedRevision {
    pub stored: StoredRevision,
    pub analysis: AnalysisResult,
}

/// Accumulator for one run.
///
/// Each step overwrites the slot it produces at the start of every attempt,
/// so a retried step never sees its own partial output.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub run: Run,
    pub source: Source,
    /// Settings snapshot taken when the run started.
    pub settings: Settings,
    pub started_at: Option<DateTime<Utc>>,
    pub fetched: Vec<FetchedItem>,
    pub normalized: Vec<NormalizedItem>,
    pub stored: Vec<StoredRevision>,
    pub changed: Vec<StoredRevision>,
    pub analyzed: Vec<AnalyzedRevision>,
    pub tickets: Vec<Ticket>,
}

impl PipelineContext {
    pub fn new(run: Run, source: Source, settings: Settings) -> Self {
        Self {
            run,
            source,
            settings,
            started_at: None,
            fetched: Vec::new(),
            normalized: Vec::new(),
            stored: Vec::new(),
            changed: Vec::new(),
            analyzed: Vec::new(),
            tickets: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run.id
    }

    /// Counts of everything accumulated so far.
    pub fn counters(&self) -> RunCounters {
        RunCounters {
            fetched: self.fetched.len() as u32,
            normalized: self.normalized.len() as u32,
            stored: self.stored.len() as u32,
            changed: self.changed.len() as u32,
            analyzed: self.analyzed.len() as u32,
            tickets_created: self.tickets.len() as u32,
        }
    }

    pub fn into_run(self) -> Run {
        self.run
    }
}
