use super::{
    types::{AnalyzerProvider, Config},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Scheduler, worker and connector limits are positive
/// - Analyzer has a model and an endpoint or key when enabled
/// - Initial runtime settings are valid
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.scheduler.tick_interval_secs == 0 {
        return Err(invalid("scheduler.tick_interval_secs must be at least 1"));
    }

    if config.worker.max_concurrent_runs == 0 {
        return Err(invalid("worker.max_concurrent_runs must be at least 1"));
    }
    if config.worker.queue_capacity == 0 {
        return Err(invalid("worker.queue_capacity must be at least 1"));
    }

    if config.connector.timeout_secs == 0 {
        return Err(invalid("connector.timeout_secs must be at least 1"));
    }
    if config.connector.max_concurrent_fetches == 0 {
        return Err(invalid("connector.max_concurrent_fetches must be at least 1"));
    }

    let analyzer = &config.analyzer;
    if analyzer.provider != AnalyzerProvider::None {
        if analyzer.model.trim().is_empty() {
            return Err(invalid("analyzer.model is required when an analyzer provider is set"));
        }
        // Ollama runs locally and needs no key.
        if analyzer.provider == AnalyzerProvider::Anthropic
            && analyzer.api_key.is_none()
            && analyzer.api_base.is_none()
        {
            return Err(invalid("analyzer.api_key or analyzer.api_base is required for anthropic"));
        }
    }

    config
        .settings
        .validate()
        .map_err(|e| ConfigError::ValidationError(format!("settings: {}", e)))?;

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_worker_fails() {
        let mut config = Config::default();
        config.worker.max_concurrent_runs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_anthropic_requires_key() {
        let mut config = Config::default();
        config.analyzer = AnalyzerConfig {
            provider: AnalyzerProvider::Anthropic,
            model: "claude-3-haiku-20240307".to_string(),
            ..AnalyzerConfig::default()
        };
        assert!(validate_config(&config).is_err());

        config.analyzer.api_key = Some("sk-test".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_ollama_requires_model_only() {
        let mut config = Config::default();
        config.analyzer.provider = AnalyzerProvider::Ollama;
        assert!(validate_config(&config).is_err());

        config.analyzer.model = "llama3".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_invalid_settings_fail() {
        let mut config = Config::default();
        config.settings.max_step_attempts = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("max_step_attempts"));
    }
}
