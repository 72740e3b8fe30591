use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::scheduler::SchedulerConfig;
use crate::settings::Settings;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub connector: ConnectorConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    /// Initial runtime settings, seeded into the settings store on first start.
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("compliance-watch.db")
}

/// Run worker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Runs executed at the same time by this worker.
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    /// Pending runs the queue holds before enqueueing waits.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: default_max_concurrent_runs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_max_concurrent_runs() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    100
}

/// Web connector configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectorConfig {
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Pages fetched in parallel for one source.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout() -> u32 {
    30
}

fn default_max_concurrent_fetches() -> usize {
    4
}

fn default_user_agent() -> String {
    format!("compliance-watch/{}", env!("CARGO_PKG_VERSION"))
}

/// Available analyzer backends
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerProvider {
    /// No analyzer: changed content is recorded as UNCERTAIN.
    #[default]
    None,
    Anthropic,
    Ollama,
}

impl AnalyzerProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalyzerProvider::None => "none",
            AnalyzerProvider::Anthropic => "anthropic",
            AnalyzerProvider::Ollama => "ollama",
        }
    }
}

/// Compliance analyzer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub provider: AnalyzerProvider,
    /// Model name/identifier.
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Custom API base URL (for proxies or self-hosted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Request timeout in seconds (default: 60)
    #[serde(default = "default_analyzer_timeout")]
    pub timeout_secs: u32,
    /// Maximum tokens for completions.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            provider: AnalyzerProvider::None,
            model: String::new(),
            api_key: None,
            api_base: None,
            timeout_secs: default_analyzer_timeout(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_analyzer_timeout() -> u32 {
    60
}

fn default_max_tokens() -> u32 {
    2048
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub connector: ConnectorConfig,
    pub analyzer: SanitizedAnalyzerConfig,
    pub settings: Settings,
    pub logging: LoggingConfig,
}

/// Sanitized analyzer config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAnalyzerConfig {
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    pub api_key_configured: bool,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            scheduler: config.scheduler.clone(),
            worker: config.worker.clone(),
            connector: config.connector.clone(),
            analyzer: SanitizedAnalyzerConfig {
                provider: config.analyzer.provider.as_str().to_string(),
                model: config.analyzer.model.clone(),
                api_base: config.analyzer.api_base.clone(),
                api_key_configured: config
                    .analyzer
                    .api_key
                    .as_ref()
                    .is_some_and(|k| !k.is_empty()),
                timeout_secs: config.analyzer.timeout_secs,
            },
            settings: config.settings.clone(),
            logging: config.logging.clone(),
        }
    }
}
