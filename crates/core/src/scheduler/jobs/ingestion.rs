//! Periodic ingestion scan.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::metrics;
use crate::pipeline::RunDispatcher;
use crate::run::{RunStatus, RunStore, RunTrigger, ABANDONED};
use crate::scheduler::{JobError, JobLock, ScheduledJob};
use crate::settings::SettingsProvider;
use crate::source::SourceStore;

/// Queues a scheduled run for every enabled source that is due.
///
/// A source is due when it has never run, or when its crawl interval has
/// elapsed since its latest run was created. Sources with a run still in
/// progress are left alone; runs idle for longer than
/// `abandoned_run_minutes` are failed first so they stop blocking their source.
pub struct IngestionScanJob {
    sources: Arc<dyn SourceStore>,
    runs: Arc<dyn RunStore>,
    settings: Arc<dyn SettingsProvider>,
    dispatcher: RunDispatcher,
}

impl IngestionScanJob {
    pub fn new(
        sources: Arc<dyn SourceStore>,
        runs: Arc<dyn RunStore>,
        settings: Arc<dyn SettingsProvider>,
        dispatcher: RunDispatcher,
    ) -> Self {
        Self {
            sources,
            runs,
            settings,
            dispatcher,
        }
    }
}

#[async_trait]
impl ScheduledJob for IngestionScanJob {
    fn lock(&self) -> JobLock {
        JobLock::IngestionScan
    }

    async fn run(&self) -> Result<(), JobError> {
        let settings = self.settings.current()?;
        let now = Utc::now();
        let mut queued = 0;

        let cutoff = now - Duration::minutes(settings.abandoned_run_minutes as i64);
        for run in self.runs.fail_stale(cutoff, ABANDONED)? {
            warn!(run_id = %run.id, source_id = %run.source_id, "Failed abandoned run");
            metrics::RUNS_FINISHED
                .with_label_values(&[RunStatus::Failed.as_str()])
                .inc();
        }

        for source in self.sources.list_enabled()? {
            if self.runs.has_running(&source.id)? {
                debug!(source_id = %source.id, "Run in progress, not queueing");
                continue;
            }

            let interval = Duration::minutes(
                source.crawl_interval_minutes_or(settings.default_crawl_interval_minutes) as i64,
            );
            let due = match self.runs.latest_for_source(&source.id)? {
                Some(latest) => now - latest.created_at >= interval,
                None => true,
            };
            if !due {
                continue;
            }

            self.dispatcher
                .trigger(&source.id, RunTrigger::Scheduled)
                .await?;
            queued += 1;
        }

        if queued > 0 {
            info!(queued, "Ingestion scan queued runs");
        } else {
            debug!("Ingestion scan found no due sources");
        }
        Ok(())
    }
}
