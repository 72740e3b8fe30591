pub mod analysis;
pub mod audit;
pub mod config;
pub mod connector;
pub mod content;
pub mod db;
pub mod metrics;
pub mod pipeline;
pub mod run;
pub mod scheduler;
pub mod settings;
pub mod source;
pub mod testing;
pub mod ticket;

pub use analysis::{
    AnalysisStore, AnthropicClient, ComplianceAnalyzer, ComplianceStatus, LlmAnalyzer, LlmClient,
    OllamaClient, RuleStore, Severity, SqliteAnalysisStore, SqliteRuleStore,
};
pub use audit::{
    create_audit_system, AuditEvent, AuditHandle, AuditStore, AuditWriter, SqliteAuditStore,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AnalyzerConfig, AnalyzerProvider, Config,
    ConfigError, LogFormat, SanitizedConfig,
};
pub use connector::{Connector, ConnectorError, ConnectorRegistry, WebConnector};
pub use content::{ContentStore, SqliteContentStore};
pub use db::StoreError;
pub use pipeline::{
    PipelineDeps, PipelineError, PipelineRunner, QueueError, RunDispatcher, RunQueue, RunWorker,
};
pub use run::{PipelineStep, Run, RunStatus, RunStore, RunTrigger, SqliteRunStore};
pub use scheduler::{
    EscalationSweepJob, InMemoryLockProvider, IngestionScanJob, JobLock, LockProvider,
    RetentionPurgeJob, Scheduler, SchedulerConfig, SqliteLockProvider,
};
pub use settings::{Settings, SettingsProvider, SqliteSettingsStore, StaticSettings};
pub use source::{Source, SourceStore, SqliteSourceStore};
pub use ticket::{SqliteTicketStore, Ticket, TicketStatus, TicketStore};
