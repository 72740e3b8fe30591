//! The eight step functions.
//!
//! Steps communicate through the [`PipelineContext`] and never touch step
//! records or the run status; the one exception is `finish`, which writes the
//! run's counters and terminal status for the runner to persist.

use std::collections::HashSet;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::analysis::{
    redact_pii, AnalysisRequest, ComplianceStatus, NewAnalysis, RuleSnapshot,
};
use crate::audit::AuditEvent;
use crate::content::{normalize_item, StoredRevision};
use crate::metrics;
use crate::run::{PipelineStep, RunStatus};
use crate::ticket::{NewTicket, Ticket};

use super::context::{AnalyzedRevision, PipelineContext};
use super::types::{PipelineDeps, StepError};

/// Executes individual steps against the shared collaborators.
#[derive(Clone)]
pub struct PipelineSteps {
    deps: PipelineDeps,
}

impl PipelineSteps {
    pub fn new(deps: PipelineDeps) -> Self {
        Self { deps }
    }

    /// Run one attempt of `step`.
    pub async fn execute(
        &self,
        step: PipelineStep,
        ctx: &mut PipelineContext,
    ) -> Result<(), StepError> {
        match step {
            PipelineStep::Start => self.start(ctx),
            PipelineStep::Fetch => self.fetch(ctx).await,
            PipelineStep::Normalize => self.normalize(ctx),
            PipelineStep::StoreRevision => self.store_revision(ctx),
            PipelineStep::Diff => self.diff(ctx),
            PipelineStep::Analyze => self.analyze(ctx).await,
            PipelineStep::UpsertTicket => self.upsert_ticket(ctx).await,
            PipelineStep::Finish => self.finish(ctx),
        }
    }

    fn start(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        ctx.started_at = Some(Utc::now());
        Ok(())
    }

    async fn fetch(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        ctx.fetched.clear();

        let connector = self.deps.connectors.get(&ctx.source.channel)?;
        let items = connector.fetch(&ctx.source).await?;

        debug!(
            run_id = %ctx.run.id,
            connector = connector.name(),
            items = items.len(),
            "Fetched items"
        );
        ctx.fetched = items;
        Ok(())
    }

    fn normalize(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        // Two URLs can canonicalize to the same item; the first one wins.
        let mut seen = HashSet::new();
        ctx.normalized = ctx
            .fetched
            .iter()
            .map(normalize_item)
            .filter(|item| seen.insert(item.external_id.clone()))
            .collect();
        Ok(())
    }

    fn store_revision(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        ctx.stored.clear();

        for item in &ctx.normalized {
            let stored = self
                .deps
                .content
                .store_revision(&ctx.source.id, &ctx.run.id, item)?;
            ctx.stored.push(stored);
        }
        Ok(())
    }

    fn diff(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        ctx.changed = ctx
            .stored
            .iter()
            .filter(|s| s.is_changed())
            .cloned()
            .collect();

        debug!(
            run_id = %ctx.run.id,
            stored = ctx.stored.len(),
            changed = ctx.changed.len(),
            "Diffed stored items"
        );
        Ok(())
    }

    async fn analyze(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        ctx.analyzed.clear();
        if ctx.changed.is_empty() {
            return Ok(());
        }

        let rules = self
            .deps
            .rules
            .active_rules(&ctx.source.channel, &ctx.source.country)?;
        let snapshots: Vec<RuleSnapshot> = rules.iter().map(|r| r.snapshot()).collect();
        let redact = ctx.source.redacts_pii(ctx.settings.pii_redaction_default);

        let mut analyzed = Vec::with_capacity(ctx.changed.len());
        for stored in &ctx.changed {
            let revision = &stored.revision;

            if let Some(existing) = self.deps.analyses.get_for_revision(&revision.id)? {
                analyzed.push(AnalyzedRevision {
                    stored: stored.clone(),
                    analysis: existing,
                });
                continue;
            }

            let new_analysis = if snapshots.is_empty() {
                NewAnalysis {
                    revision_id: revision.id.clone(),
                    status: ComplianceStatus::Compliant,
                    language: None,
                    confidence: None,
                    violations: Vec::new(),
                    reason: Some("no active rules".to_string()),
                }
            } else {
                self.submit(stored, &snapshots, redact).await
            };

            let analysis = self.deps.analyses.insert_if_absent(new_analysis)?;
            metrics::ANALYSES_TOTAL
                .with_label_values(&[analysis.status.as_str()])
                .inc();
            analyzed.push(AnalyzedRevision {
                stored: stored.clone(),
                analysis,
            });
        }

        ctx.analyzed = analyzed;
        Ok(())
    }

    /// Ask the analyzer for a verdict, degrading every failure to UNCERTAIN.
    async fn submit(
        &self,
        stored: &StoredRevision,
        rules: &[RuleSnapshot],
        redact: bool,
    ) -> NewAnalysis {
        let revision = &stored.revision;
        let Some(analyzer) = self.deps.analyzer.as_ref() else {
            return NewAnalysis::uncertain(&revision.id, "analyzer unavailable");
        };

        let (title, text) = if redact {
            (
                revision.title.as_deref().map(redact_pii),
                redact_pii(&revision.text),
            )
        } else {
            (revision.title.clone(), revision.text.clone())
        };

        let request = AnalysisRequest {
            title,
            text,
            url: revision.url.clone(),
            rules: rules.to_vec(),
            redacted: redact,
        };

        match analyzer.analyze(&request).await {
            Ok(verdict) => NewAnalysis {
                revision_id: revision.id.clone(),
                status: verdict.compliance_status,
                language: verdict.language,
                confidence: verdict.confidence,
                violations: verdict.violations,
                reason: None,
            },
            Err(e) => {
                warn!(
                    revision_id = %revision.id,
                    analyzer = analyzer.name(),
                    error = %e,
                    "Analysis failed, recording as uncertain"
                );
                NewAnalysis::uncertain(&revision.id, e.to_string())
            }
        }
    }

    async fn upsert_ticket(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        ctx.tickets.clear();
        let now = Utc::now();

        for analyzed in &ctx.analyzed {
            let analysis = &analyzed.analysis;
            if !analysis.status.needs_ticket() {
                continue;
            }

            let key = Ticket::key_for_revision(&analysis.revision_id);
            // Every revision here was created by this run, so an existing
            // ticket comes from an earlier attempt of this step.
            if let Some(existing) = self.deps.tickets.find_by_key(&key)? {
                ctx.tickets.push(existing);
                continue;
            }

            let risk = match analysis.status {
                ComplianceStatus::NonCompliant => analysis
                    .highest_severity()
                    .unwrap_or(ctx.settings.uncertain_default_risk),
                _ => ctx.settings.uncertain_default_risk,
            };
            let due_at = now + Duration::hours(ctx.settings.sla_hours.for_risk(risk) as i64);
            let revision = &analyzed.stored.revision;
            let title = format!(
                "Compliance review: {}",
                revision.title.as_deref().unwrap_or(&revision.url)
            );

            let created = self.deps.tickets.create_if_absent(NewTicket {
                idempotency_key: key.clone(),
                revision_id: analysis.revision_id.clone(),
                content_item_id: analyzed.stored.item_id.clone(),
                source_id: ctx.source.id.clone(),
                analysis_id: analysis.id.clone(),
                title,
                risk_level: risk,
                due_at,
            })?;

            let ticket = match created {
                Some(ticket) => ticket,
                // Lost a race with a concurrent insert of the same key.
                None => match self.deps.tickets.find_by_key(&key)? {
                    Some(ticket) => ticket,
                    None => continue,
                },
            };

            info!(
                run_id = %ctx.run.id,
                ticket_id = %ticket.id,
                risk = risk.as_str(),
                "Ticket created"
            );
            metrics::TICKETS_CREATED
                .with_label_values(&[risk.as_str()])
                .inc();
            if let Some(audit) = &self.deps.audit {
                audit
                    .emit(AuditEvent::TicketCreated {
                        ticket_id: ticket.id.clone(),
                        run_id: ctx.run.id.clone(),
                        revision_id: ticket.revision_id.clone(),
                        risk_level: risk.as_str().to_string(),
                        due_at: ticket.due_at,
                    })
                    .await;
            }
            ctx.tickets.push(ticket);
        }
        Ok(())
    }

    fn finish(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let counters = ctx.counters();
        metrics::REVISIONS_CREATED.inc_by(counters.changed as u64);

        ctx.run.counters = counters;
        ctx.run.status = RunStatus::Succeeded;
        ctx.run.error = None;
        ctx.run.finished_at = Some(Utc::now());
        Ok(())
    }
}
