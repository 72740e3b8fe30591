//! Pipeline lifecycle integration tests.
//!
//! These tests drive whole runs through the runner with a mock connector and
//! analyzer over in-memory stores:
//! - Step state transitions and terminal statuses
//! - Retry with backoff, and failure after the last attempt
//! - Cooperative cancellation between steps
//! - Retried steps converging on what an earlier attempt already wrote
//! - Change detection, analysis and ticket creation across runs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use compliance_watch_core::{
    analysis::{AnalysisStore, ComplianceAnalyzer, ComplianceStatus, RuleStore, Severity},
    connector::{Connector, ConnectorError},
    content::{
        ContentItem, ContentStore, FetchedItem, NormalizedItem, Revision, SqliteContentStore,
        StoredRevision,
    },
    db::StoreError,
    pipeline::{PipelineError, PipelineRunner},
    run::{PipelineStep, Run, RunStatus, RunStore, RunTrigger, SqliteRunStore, StepStatus},
    source::{Source, SourceStore},
    testing::{fixtures, MockAnalyzer, MockConnector, TestStores},
    ticket::{
        EscalationLevel, NewTicket, SqliteTicketStore, Ticket, TicketEvent, TicketEventKind,
        TicketFilter, TicketStatus, TicketStore,
    },
};

const OFFER_URL: &str = "https://example.com/offer";

/// Test helper wiring stores, connector and analyzer into a runner.
struct TestHarness {
    stores: TestStores,
    connector: Arc<MockConnector>,
    analyzer: Arc<MockAnalyzer>,
    runner: PipelineRunner,
    source: Source,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_analyzer(Some(Arc::new(MockAnalyzer::new())))
    }

    fn with_analyzer(analyzer: Option<Arc<MockAnalyzer>>) -> Self {
        let stores = TestStores::new().unwrap();
        let connector = Arc::new(MockConnector::with_items(vec![fixtures::fetched_item(
            OFFER_URL,
            "Open an account today and earn 5% interest.",
        )]));
        let deps = stores.deps(
            connector.clone(),
            analyzer
                .clone()
                .map(|a| a as Arc<dyn ComplianceAnalyzer>),
        );
        let runner = PipelineRunner::new(deps);
        let source = stores
            .sources
            .create(fixtures::source_request("Landing pages", &[OFFER_URL]))
            .unwrap();

        Self {
            stores,
            connector,
            analyzer: analyzer.unwrap_or_else(|| Arc::new(MockAnalyzer::new())),
            runner,
            source,
        }
    }

    async fn run_once(&self) -> Run {
        let run = self
            .stores
            .runs
            .create(&self.source.id, RunTrigger::Manual)
            .unwrap();
        self.runner.execute(&self.source.id, &run.id).await.unwrap()
    }
}

fn statuses(run: &Run) -> Vec<StepStatus> {
    run.steps.iter().map(|s| s.status).collect()
}

#[tokio::test]
async fn test_successful_run_completes_every_step() {
    let harness = TestHarness::new();
    let run = harness.run_once().await;

    assert_eq!(run.status, RunStatus::Succeeded);
    assert!(run.error.is_none());
    assert!(run.finished_at.is_some());
    assert!(run.has_valid_step_sequence());
    assert!(run.steps.iter().all(|s| s.status == StepStatus::Succeeded));
    assert!(run.steps.iter().all(|s| s.attempts == 1));

    assert_eq!(run.counters.fetched, 1);
    assert_eq!(run.counters.normalized, 1);
    assert_eq!(run.counters.stored, 1);
    assert_eq!(run.counters.changed, 1);

    // The persisted run matches the returned one.
    let persisted = harness.stores.runs.get(&run.id).unwrap().unwrap();
    assert_eq!(persisted.status, RunStatus::Succeeded);
    assert_eq!(statuses(&persisted), statuses(&run));
}

#[tokio::test]
async fn test_failing_fetch_exhausts_attempts() {
    let harness = TestHarness::new();
    harness.connector.fail_always("connection reset");

    let run = harness.run_once().await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(harness.connector.call_count(), 3);
    assert!(run.has_valid_step_sequence());

    let fetch = run.step(PipelineStep::Fetch);
    assert_eq!(fetch.status, StepStatus::Failed);
    assert_eq!(fetch.attempts, 3);
    assert!(fetch.last_error.as_deref().unwrap().contains("connection reset"));
    assert!(run.error.as_deref().unwrap().contains("connection reset"));

    assert_eq!(run.step(PipelineStep::Start).status, StepStatus::Succeeded);
    for step in &PipelineStep::ALL[2..] {
        assert_eq!(run.step(*step).status, StepStatus::Skipped, "{}", step);
        assert_eq!(run.step(*step).attempts, 0);
    }
}

#[tokio::test]
async fn test_transient_fetch_failure_is_retried() {
    let harness = TestHarness::new();
    harness.connector.fail_times(2, "timeout");

    let run = harness.run_once().await;

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(harness.connector.call_count(), 3);

    let fetch = run.step(PipelineStep::Fetch);
    assert_eq!(fetch.status, StepStatus::Succeeded);
    assert_eq!(fetch.attempts, 3);
    assert!(fetch.last_error.as_deref().unwrap().contains("timeout"));
}

/// Connector that requests cancellation of the active run while fetching.
struct CancelingConnector {
    inner: MockConnector,
    runs: Arc<dyn RunStore>,
}

#[async_trait]
impl Connector for CancelingConnector {
    fn name(&self) -> &str {
        "canceling"
    }

    async fn fetch(&self, source: &Source) -> Result<Vec<FetchedItem>, ConnectorError> {
        let run = self.runs.latest_for_source(&source.id).unwrap().unwrap();
        assert!(self.runs.request_cancel(&run.id).unwrap());
        self.inner.fetch(source).await
    }
}

#[tokio::test]
async fn test_cancel_takes_effect_before_next_step() {
    let stores = TestStores::new().unwrap();
    let connector = Arc::new(CancelingConnector {
        inner: MockConnector::with_items(vec![fixtures::fetched_item(OFFER_URL, "Offer")]),
        runs: stores.runs.clone(),
    });
    let runner = PipelineRunner::new(stores.deps(connector, None));
    let source = stores
        .sources
        .create(fixtures::source_request("Landing pages", &[OFFER_URL]))
        .unwrap();
    let run = stores.runs.create(&source.id, RunTrigger::Manual).unwrap();

    let run = runner.execute(&source.id, &run.id).await.unwrap();

    assert_eq!(run.status, RunStatus::Canceled);
    assert!(run.finished_at.is_some());
    assert!(run.has_valid_step_sequence());
    assert_eq!(run.step(PipelineStep::Start).status, StepStatus::Succeeded);
    assert_eq!(run.step(PipelineStep::Fetch).status, StepStatus::Succeeded);
    for step in &PipelineStep::ALL[2..] {
        assert_eq!(run.step(*step).status, StepStatus::Skipped, "{}", step);
    }

    // Nothing past the fetch was stored.
    let item = stores
        .content
        .find_item(&source.id, &fixtures::fetched_item(OFFER_URL, "").external_id)
        .unwrap();
    assert!(item.is_none());
}

#[tokio::test]
async fn test_cancel_requested_before_execution() {
    let harness = TestHarness::new();
    let run = harness
        .stores
        .runs
        .create(&harness.source.id, RunTrigger::Manual)
        .unwrap();
    assert!(harness.stores.runs.request_cancel(&run.id).unwrap());

    let run = harness
        .runner
        .execute(&harness.source.id, &run.id)
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Canceled);
    assert_eq!(run.step(PipelineStep::Start).status, StepStatus::Succeeded);
    assert_eq!(run.step(PipelineStep::Fetch).status, StepStatus::Skipped);
    assert_eq!(harness.connector.call_count(), 0);
}

#[tokio::test]
async fn test_missing_source_fails_at_start() {
    let harness = TestHarness::new();
    let run = harness
        .stores
        .runs
        .create("missing-source", RunTrigger::Scheduled)
        .unwrap();

    let run = harness
        .runner
        .execute("missing-source", &run.id)
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error.as_deref(), Some("source not found"));
    assert_eq!(run.step(PipelineStep::Start).status, StepStatus::Failed);
    assert!(run.has_valid_step_sequence());
    assert_eq!(harness.connector.call_count(), 0);
}

#[tokio::test]
async fn test_finished_and_unknown_runs_are_rejected() {
    let harness = TestHarness::new();
    let run = harness.run_once().await;

    let err = harness
        .runner
        .execute(&harness.source.id, &run.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::AlreadyFinished {
            status: RunStatus::Succeeded,
            ..
        }
    ));

    let err = harness
        .runner
        .execute(&harness.source.id, "no-such-run")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::RunNotFound(id) if id == "no-such-run"));
}

#[tokio::test]
async fn test_changed_content_creates_revision_analysis_and_ticket() {
    let harness = TestHarness::new();
    let rule = harness
        .stores
        .rules
        .create_rule(fixtures::rule_request("No guaranteed returns", Severity::Critical))
        .unwrap();
    let minor = harness
        .stores
        .rules
        .create_rule(fixtures::rule_request("Show risk warning", Severity::Low))
        .unwrap();

    // First run: new content, compliant.
    let first = harness.run_once().await;
    assert_eq!(first.status, RunStatus::Succeeded);
    assert_eq!(first.counters.changed, 1);
    assert_eq!(first.counters.analyzed, 1);
    assert_eq!(first.counters.tickets_created, 0);

    // Second run with identical content: nothing new.
    let second = harness.run_once().await;
    assert_eq!(second.status, RunStatus::Succeeded);
    assert_eq!(second.counters.changed, 0);
    assert_eq!(second.counters.analyzed, 0);
    assert_eq!(harness.analyzer.requests().len(), 1);

    // Third run: changed text, the analyzer flags both rules.
    harness.connector.set_items(vec![fixtures::fetched_item(
        OFFER_URL,
        "Guaranteed 12% returns, no risk at all!",
    )]);
    harness
        .analyzer
        .set_verdict(fixtures::non_compliant(&[&rule, &minor]));

    let third = harness.run_once().await;
    assert_eq!(third.status, RunStatus::Succeeded);
    assert_eq!(third.counters.changed, 1);
    assert_eq!(third.counters.analyzed, 1);
    assert_eq!(third.counters.tickets_created, 1);

    let external_id = fixtures::fetched_item(OFFER_URL, "").external_id;
    let item = harness
        .stores
        .content
        .find_item(&harness.source.id, &external_id)
        .unwrap()
        .unwrap();
    let revisions = harness.stores.content.list_revisions(&item.id).unwrap();
    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[1].run_id, third.id);
    assert_eq!(item.current_revision_id.as_deref(), Some(revisions[1].id.as_str()));

    let analysis = harness
        .stores
        .analyses
        .get_for_revision(&revisions[1].id)
        .unwrap()
        .unwrap();
    assert_eq!(analysis.status, ComplianceStatus::NonCompliant);
    assert_eq!(analysis.violations.len(), 2);

    let tickets = harness.stores.tickets.list(&TicketFilter::new()).unwrap();
    assert_eq!(tickets.len(), 1);
    let ticket = &tickets[0];
    assert_eq!(ticket.revision_id, revisions[1].id);
    assert_eq!(ticket.analysis_id, analysis.id);
    assert_eq!(ticket.status, TicketStatus::Open);
    assert_eq!(ticket.risk_level, Severity::Critical);
    let sla = ticket.due_at - ticket.created_at;
    assert!((sla - Duration::hours(24)).num_seconds().abs() < 5);
}

#[tokio::test]
async fn test_no_active_rules_is_compliant_without_analyzer_call() {
    let harness = TestHarness::new();
    let run = harness.run_once().await;

    assert_eq!(run.counters.analyzed, 1);
    assert_eq!(run.counters.tickets_created, 0);
    assert!(harness.analyzer.requests().is_empty());

    let revision_id = harness
        .stores
        .content
        .find_item(&harness.source.id, &fixtures::fetched_item(OFFER_URL, "").external_id)
        .unwrap()
        .unwrap()
        .current_revision_id
        .unwrap();
    let analysis = harness
        .stores
        .analyses
        .get_for_revision(&revision_id)
        .unwrap()
        .unwrap();
    assert_eq!(analysis.status, ComplianceStatus::Compliant);
    assert_eq!(analysis.reason.as_deref(), Some("no active rules"));
}

#[tokio::test]
async fn test_missing_analyzer_records_uncertain_ticket() {
    let harness = TestHarness::with_analyzer(None);
    harness
        .stores
        .rules
        .create_rule(fixtures::rule_request("No guaranteed returns", Severity::High))
        .unwrap();

    let run = harness.run_once().await;
    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.counters.tickets_created, 1);

    let tickets = harness.stores.tickets.list(&TicketFilter::new()).unwrap();
    assert_eq!(tickets.len(), 1);
    // UNCERTAIN results take the configured default risk.
    assert_eq!(tickets[0].risk_level, Severity::Medium);

    let analysis = harness
        .stores
        .analyses
        .get_for_revision(&tickets[0].revision_id)
        .unwrap()
        .unwrap();
    assert_eq!(analysis.status, ComplianceStatus::Uncertain);
    assert_eq!(analysis.reason.as_deref(), Some("analyzer unavailable"));
}

#[tokio::test]
async fn test_analyzer_error_degrades_to_uncertain() {
    let harness = TestHarness::with_analyzer(Some(Arc::new(MockAnalyzer::failing(
        "model overloaded",
    ))));
    harness
        .stores
        .rules
        .create_rule(fixtures::rule_request("No guaranteed returns", Severity::High))
        .unwrap();

    let run = harness.run_once().await;

    // Analyzer failures never fail the step.
    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.step(PipelineStep::Analyze).attempts, 1);
    assert_eq!(run.counters.tickets_created, 1);

    let tickets = harness.stores.tickets.list(&TicketFilter::new()).unwrap();
    let analysis = harness
        .stores
        .analyses
        .get_for_revision(&tickets[0].revision_id)
        .unwrap()
        .unwrap();
    assert_eq!(analysis.status, ComplianceStatus::Uncertain);
    assert!(analysis.reason.unwrap().contains("model overloaded"));
}

#[tokio::test]
async fn test_pii_is_redacted_before_analysis() {
    let harness = TestHarness::new();
    harness
        .stores
        .rules
        .create_rule(fixtures::rule_request("No guaranteed returns", Severity::High))
        .unwrap();
    harness.connector.set_items(vec![fixtures::fetched_item(
        OFFER_URL,
        "Questions? Write to jane.doe@example.com for details.",
    )]);

    harness.run_once().await;

    let requests = harness.analyzer.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].redacted);
    assert!(requests[0].text.contains("[EMAIL]"));
    assert!(!requests[0].text.contains("jane.doe@example.com"));
    assert_eq!(requests[0].rules.len(), 1);
}

/// Run store that raises the cancel flag on a given poll of it.
struct CancelOnPoll {
    inner: Arc<SqliteRunStore>,
    polls: AtomicUsize,
    cancel_on: usize,
}

impl RunStore for CancelOnPoll {
    fn create(&self, source_id: &str, trigger: RunTrigger) -> Result<Run, StoreError> {
        self.inner.create(source_id, trigger)
    }

    fn get(&self, id: &str) -> Result<Option<Run>, StoreError> {
        self.inner.get(id)
    }

    fn save_progress(&self, run: &Run) -> Result<(), StoreError> {
        self.inner.save_progress(run)
    }

    fn request_cancel(&self, id: &str) -> Result<bool, StoreError> {
        self.inner.request_cancel(id)
    }

    fn is_cancel_requested(&self, id: &str) -> Result<bool, StoreError> {
        if self.polls.fetch_add(1, Ordering::SeqCst) + 1 == self.cancel_on {
            self.inner.request_cancel(id)?;
        }
        self.inner.is_cancel_requested(id)
    }

    fn latest_for_source(&self, source_id: &str) -> Result<Option<Run>, StoreError> {
        self.inner.latest_for_source(source_id)
    }

    fn has_running(&self, source_id: &str) -> Result<bool, StoreError> {
        self.inner.has_running(source_id)
    }

    fn list_for_source(&self, source_id: &str, limit: i64) -> Result<Vec<Run>, StoreError> {
        self.inner.list_for_source(source_id, limit)
    }

    fn fail_stale(&self, cutoff: DateTime<Utc>, reason: &str) -> Result<Vec<Run>, StoreError> {
        self.inner.fail_stale(cutoff, reason)
    }

    fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.inner.delete_finished_before(cutoff)
    }
}

#[tokio::test]
async fn test_cancel_after_normalize_skips_remaining_steps() {
    let stores = TestStores::new().unwrap();
    let connector = Arc::new(MockConnector::with_items(vec![fixtures::fetched_item(
        OFFER_URL, "Offer",
    )]));
    let runs = Arc::new(CancelOnPoll {
        inner: stores.runs.clone(),
        polls: AtomicUsize::new(0),
        // Polls happen before Fetch, Normalize and StoreRevision.
        cancel_on: 3,
    });
    let mut deps = stores.deps(connector, None);
    deps.runs = runs;
    let runner = PipelineRunner::new(deps);

    let source = stores
        .sources
        .create(fixtures::source_request("Landing pages", &[OFFER_URL]))
        .unwrap();
    let run = stores.runs.create(&source.id, RunTrigger::Manual).unwrap();

    let run = runner.execute(&source.id, &run.id).await.unwrap();

    assert_eq!(run.status, RunStatus::Canceled);
    assert!(run.has_valid_step_sequence());
    for step in &PipelineStep::ALL[..3] {
        assert_eq!(run.step(*step).status, StepStatus::Succeeded, "{}", step);
    }
    for step in &PipelineStep::ALL[3..] {
        assert_eq!(run.step(*step).status, StepStatus::Skipped, "{}", step);
        assert_eq!(run.step(*step).attempts, 0);
    }

    let persisted = stores.runs.get(&run.id).unwrap().unwrap();
    assert_eq!(persisted.status, RunStatus::Canceled);
    assert_eq!(statuses(&persisted), statuses(&run));
}

/// Content store whose writes land but report a failure the first time.
struct FlakyContentStore {
    inner: Arc<SqliteContentStore>,
    failures_left: AtomicUsize,
}

impl ContentStore for FlakyContentStore {
    fn store_revision(
        &self,
        source_id: &str,
        run_id: &str,
        item: &NormalizedItem,
    ) -> Result<StoredRevision, StoreError> {
        let stored = self.inner.store_revision(source_id, run_id, item)?;
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Database("connection lost".to_string()));
        }
        Ok(stored)
    }

    fn find_item(
        &self,
        source_id: &str,
        external_id: &str,
    ) -> Result<Option<ContentItem>, StoreError> {
        self.inner.find_item(source_id, external_id)
    }

    fn get_revision(&self, id: &str) -> Result<Option<Revision>, StoreError> {
        self.inner.get_revision(id)
    }

    fn list_revisions(&self, item_id: &str) -> Result<Vec<Revision>, StoreError> {
        self.inner.list_revisions(item_id)
    }
}

#[tokio::test]
async fn test_store_revision_retry_converges() {
    const OTHER_URL: &str = "https://example.com/terms";

    let stores = TestStores::new().unwrap();
    let connector = Arc::new(MockConnector::with_items(vec![
        fixtures::fetched_item(OFFER_URL, "Earn 5% interest."),
        fixtures::fetched_item(OTHER_URL, "Terms apply."),
    ]));
    let mut deps = stores.deps(connector, None);
    deps.content = Arc::new(FlakyContentStore {
        inner: stores.content.clone(),
        failures_left: AtomicUsize::new(1),
    });
    let runner = PipelineRunner::new(deps);

    let source = stores
        .sources
        .create(fixtures::source_request("Landing pages", &[OFFER_URL, OTHER_URL]))
        .unwrap();
    let run = stores.runs.create(&source.id, RunTrigger::Manual).unwrap();

    let run = runner.execute(&source.id, &run.id).await.unwrap();

    assert_eq!(run.status, RunStatus::Succeeded);
    let step = run.step(PipelineStep::StoreRevision);
    assert_eq!(step.attempts, 2);
    assert!(step.last_error.as_deref().unwrap().contains("connection lost"));

    // The item written by the failed attempt still counts as changed.
    assert_eq!(run.counters.stored, 2);
    assert_eq!(run.counters.changed, 2);

    for url in [OFFER_URL, OTHER_URL] {
        let external_id = fixtures::fetched_item(url, "").external_id;
        let item = stores
            .content
            .find_item(&source.id, &external_id)
            .unwrap()
            .unwrap();
        assert_eq!(item.first_seen_run_id, run.id);
        assert_eq!(stores.content.list_revisions(&item.id).unwrap().len(), 1, "{}", url);
    }
}

/// Ticket store whose creates land but report a failure the first time.
struct FlakyTicketStore {
    inner: Arc<SqliteTicketStore>,
    failures_left: AtomicUsize,
}

impl TicketStore for FlakyTicketStore {
    fn create_if_absent(&self, ticket: NewTicket) -> Result<Option<Ticket>, StoreError> {
        let created = self.inner.create_if_absent(ticket)?;
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Database("connection lost".to_string()));
        }
        Ok(created)
    }

    fn get(&self, id: &str) -> Result<Option<Ticket>, StoreError> {
        self.inner.get(id)
    }

    fn find_by_key(&self, idempotency_key: &str) -> Result<Option<Ticket>, StoreError> {
        self.inner.find_by_key(idempotency_key)
    }

    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        self.inner.list(filter)
    }

    fn count(&self, filter: &TicketFilter) -> Result<i64, StoreError> {
        self.inner.count(filter)
    }

    fn list_events(&self, ticket_id: &str) -> Result<Vec<TicketEvent>, StoreError> {
        self.inner.list_events(ticket_id)
    }

    fn update_status(&self, id: &str, status: TicketStatus) -> Result<Ticket, StoreError> {
        self.inner.update_status(id, status)
    }

    fn escalation_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<Ticket>, StoreError> {
        self.inner.escalation_candidates(cutoff)
    }

    fn escalate(
        &self,
        id: &str,
        from: EscalationLevel,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError> {
        self.inner.escalate(id, from, now)
    }

    fn overdue_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Ticket>, StoreError> {
        self.inner.overdue_candidates(now)
    }

    fn mark_overdue(&self, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.inner.mark_overdue(id, now)
    }
}

#[tokio::test]
async fn test_upsert_ticket_retry_converges() {
    let stores = TestStores::new().unwrap();
    let rule = stores
        .rules
        .create_rule(fixtures::rule_request("No guaranteed returns", Severity::High))
        .unwrap();
    let connector = Arc::new(MockConnector::with_items(vec![fixtures::fetched_item(
        OFFER_URL,
        "Guaranteed 12% returns, no risk at all!",
    )]));
    let analyzer: Arc<dyn ComplianceAnalyzer> =
        Arc::new(MockAnalyzer::with_verdict(fixtures::non_compliant(&[&rule])));
    let mut deps = stores.deps(connector, Some(analyzer));
    deps.tickets = Arc::new(FlakyTicketStore {
        inner: stores.tickets.clone(),
        failures_left: AtomicUsize::new(1),
    });
    let runner = PipelineRunner::new(deps);

    let source = stores
        .sources
        .create(fixtures::source_request("Landing pages", &[OFFER_URL]))
        .unwrap();
    let run = stores.runs.create(&source.id, RunTrigger::Manual).unwrap();

    let run = runner.execute(&source.id, &run.id).await.unwrap();

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.step(PipelineStep::UpsertTicket).attempts, 2);
    assert_eq!(run.counters.tickets_created, 1);

    let tickets = stores
        .tickets
        .list(&TicketFilter::new().with_source(source.id.as_str()))
        .unwrap();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].risk_level, Severity::High);

    let created = stores
        .tickets
        .list_events(&tickets[0].id)
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == TicketEventKind::Created)
        .count();
    assert_eq!(created, 1);
}
