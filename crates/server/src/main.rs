use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use compliance_watch_core::{
    create_audit_system, load_config, validate_config, AnalyzerConfig, AnalyzerProvider,
    AnthropicClient, AuditEvent, AuditStore, ComplianceAnalyzer, Config, ConnectorRegistry,
    EscalationSweepJob, InMemoryLockProvider, IngestionScanJob, LlmAnalyzer, LlmClient,
    LockProvider, LogFormat, OllamaClient, PipelineDeps, PipelineRunner, RetentionPurgeJob,
    RunDispatcher, RunQueue, RunWorker, Scheduler, SettingsProvider, SqliteAnalysisStore,
    SqliteAuditStore, SqliteContentStore, SqliteLockProvider, SqliteRuleStore, SqliteRunStore,
    SqliteSettingsStore, SqliteSourceStore, SqliteTicketStore, WebConnector,
};
use compliance_watch_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for audit event channel
const AUDIT_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    let config_path = std::env::var("COMPLIANCE_WATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    let config = match load_and_validate(&config_path) {
        Ok(config) => config,
        Err(e) => {
            init_logging(LogFormat::Text);
            error!("Fatal error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(config.logging.format);
    info!("Configuration loaded from {:?}", config_path);

    if let Err(e) = run(config).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_and_validate(path: &Path) -> Result<Config> {
    let config =
        load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?;
    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

fn init_logging(format: LogFormat) {
    let (json, text) = match format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Text => (None, Some(tracing_subscriber::fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(json)
        .with(text)
        .init();
}

async fn run(config: Config) -> Result<()> {
    let db_path = config.database.path.clone();
    info!("Database path: {:?}", db_path);

    // Compute config hash for audit
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // Stores, all sharing one database file
    let audit_store: Arc<dyn AuditStore> =
        Arc::new(SqliteAuditStore::new(&db_path).context("Failed to create audit store")?);
    let sources = Arc::new(SqliteSourceStore::new(&db_path).context("Failed to create source store")?);
    let runs = Arc::new(SqliteRunStore::new(&db_path).context("Failed to create run store")?);
    let content =
        Arc::new(SqliteContentStore::new(&db_path).context("Failed to create content store")?);
    let rules = Arc::new(SqliteRuleStore::new(&db_path).context("Failed to create rule store")?);
    let analyses =
        Arc::new(SqliteAnalysisStore::new(&db_path).context("Failed to create analysis store")?);
    let tickets = Arc::new(SqliteTicketStore::new(&db_path).context("Failed to create ticket store")?);
    info!("Stores initialized");

    let settings_store =
        SqliteSettingsStore::new(&db_path).context("Failed to create settings store")?;
    if settings_store
        .seed(&config.settings)
        .context("Failed to seed settings")?
    {
        info!("Seeded runtime settings from configuration");
    }
    let settings: Arc<dyn SettingsProvider> = Arc::new(settings_store);

    // Create audit system
    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), AUDIT_BUFFER_SIZE);
    let writer_handle = tokio::spawn(audit_writer.run());

    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;

    // Collaborators
    let web = WebConnector::new(&config.connector).context("Failed to create web connector")?;
    let connectors = ConnectorRegistry::new().with("web", Arc::new(web));
    info!(channels = ?connectors.channels(), "Connectors registered");

    let analyzer = build_analyzer(&config.analyzer).context("Failed to create analyzer")?;
    match &analyzer {
        Some(a) => info!(analyzer = a.name(), model = %config.analyzer.model, "Analyzer configured"),
        None => warn!("No analyzer configured, changed content will be recorded as uncertain"),
    }

    // Run queue and worker
    let deps = PipelineDeps {
        sources: sources.clone(),
        runs: runs.clone(),
        content,
        rules,
        analyses,
        tickets: tickets.clone(),
        connectors,
        analyzer,
        settings: Arc::clone(&settings),
        audit: Some(audit_handle.clone()),
    };
    let runner = Arc::new(PipelineRunner::new(deps));

    let (queue, queue_rx) = RunQueue::channel(config.worker.queue_capacity);
    let dispatcher = RunDispatcher::new(runs.clone(), queue).with_audit(audit_handle.clone());

    let (shutdown_tx, _) = broadcast::channel(1);
    let worker = RunWorker::new(queue_rx, runner, config.worker.max_concurrent_runs);
    let worker_handle = tokio::spawn(worker.run(shutdown_tx.subscribe()));

    // Scheduler
    let locks: Arc<dyn LockProvider> = match &config.scheduler.lock_dir {
        Some(dir) => {
            info!("Using SQLite job locks in {:?}", dir);
            Arc::new(SqliteLockProvider::new(dir).context("Failed to create lock provider")?)
        }
        None => Arc::new(InMemoryLockProvider::new()),
    };

    let scheduler = Arc::new(
        Scheduler::new(locks, Duration::from_secs(config.scheduler.tick_interval_secs))
            .with_audit(audit_handle.clone())
            .with_job(Arc::new(IngestionScanJob::new(
                sources.clone(),
                runs.clone(),
                Arc::clone(&settings),
                dispatcher.clone(),
            )))
            .with_job(Arc::new(
                EscalationSweepJob::new(tickets.clone(), Arc::clone(&settings))
                    .with_audit(audit_handle.clone()),
            ))
            .with_job(Arc::new(RetentionPurgeJob::new(
                Arc::clone(&audit_store),
                runs.clone(),
                Arc::clone(&settings),
            ))),
    );

    let scheduler_handle = if config.scheduler.enabled {
        scheduler.start()
    } else {
        info!("Scheduler disabled in config");
        None
    };

    // Create app state and router
    let state = Arc::new(AppState::new(
        config.clone(),
        audit_handle.clone(),
        sources,
        runs,
        tickets,
        dispatcher,
    ));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");

    if let Some(handle) = scheduler_handle {
        scheduler.stop();
        let _ = handle.await;
        info!("Scheduler stopped");
    }
    // The ingestion job holds a queue handle; dropping the scheduler lets the
    // worker see the queue close.
    drop(scheduler);

    let _ = shutdown_tx.send(());
    let _ = worker_handle.await;

    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // The writer exits once every AuditHandle is gone.
    drop(audit_handle);
    let _ = writer_handle.await;
    info!("Audit writer stopped");

    Ok(())
}

/// Build the compliance analyzer selected in config, if any.
fn build_analyzer(config: &AnalyzerConfig) -> Result<Option<Arc<dyn ComplianceAnalyzer>>> {
    let timeout = Duration::from_secs(config.timeout_secs as u64);

    let client: Arc<dyn LlmClient> = match config.provider {
        AnalyzerProvider::None => return Ok(None),
        AnalyzerProvider::Anthropic => {
            let mut client = AnthropicClient::new(
                config.api_key.clone().unwrap_or_default(),
                config.model.clone(),
            )?;
            if let Some(api_base) = &config.api_base {
                client = client.with_api_base(api_base.clone());
            }
            Arc::new(client.with_timeout(timeout)?)
        }
        AnalyzerProvider::Ollama => {
            let mut client = OllamaClient::new(config.model.clone())?;
            if let Some(api_base) = &config.api_base {
                client = client.with_api_base(api_base.clone());
            }
            Arc::new(client.with_timeout(timeout)?)
        }
    };

    Ok(Some(Arc::new(
        LlmAnalyzer::new(client).with_max_tokens(config.max_tokens),
    )))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
