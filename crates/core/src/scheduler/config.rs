//! Scheduler configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the background scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Enable/disable the scheduler.
    /// When disabled, runs are only started through the API.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between ticks.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Directory holding one lock file per job.
    /// Workers sharing a database must share this directory. When unset,
    /// locks are process-local.
    #[serde(default)]
    pub lock_dir: Option<PathBuf>,
}

fn default_enabled() -> bool {
    true
}

fn default_tick_interval() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            tick_interval_secs: default_tick_interval(),
            lock_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.tick_interval_secs, 60);
        assert!(config.lock_dir.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SchedulerConfig = toml::from_str("lock_dir = \"/var/lib/cw/locks\"").unwrap();
        assert!(config.enabled);
        assert_eq!(config.tick_interval_secs, 60);
        assert_eq!(config.lock_dir, Some(PathBuf::from("/var/lib/cw/locks")));
    }
}
