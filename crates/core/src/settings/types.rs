//! Runtime settings types.

use serde::{Deserialize, Serialize};

use crate::analysis::Severity;

use super::SettingsError;

/// SLA window per risk tier, in hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaHours {
    #[serde(default = "default_sla_low")]
    pub low: u32,
    #[serde(default = "default_sla_medium")]
    pub medium: u32,
    #[serde(default = "default_sla_high")]
    pub high: u32,
    #[serde(default = "default_sla_critical")]
    pub critical: u32,
}

impl Default for SlaHours {
    fn default() -> Self {
        Self {
            low: default_sla_low(),
            medium: default_sla_medium(),
            high: default_sla_high(),
            critical: default_sla_critical(),
        }
    }
}

impl SlaHours {
    pub fn for_risk(&self, risk: Severity) -> u32 {
        match risk {
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
            Severity::Critical => self.critical,
        }
    }
}

fn default_sla_low() -> u32 {
    336
}

fn default_sla_medium() -> u32 {
    168
}

fn default_sla_high() -> u32 {
    72
}

fn default_sla_critical() -> u32 {
    24
}

/// Operator-tunable settings read by the pipeline and the scheduler jobs.
///
/// Re-read on every run and job invocation, never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub sla_hours: SlaHours,
    /// Risk assigned to UNCERTAIN results and results without violations.
    #[serde(default = "default_uncertain_risk")]
    pub uncertain_default_risk: Severity,
    /// Open tickets untouched for longer than this are escalated one tier.
    #[serde(default = "default_escalation_threshold_hours")]
    pub escalation_threshold_hours: u32,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_max_step_attempts")]
    pub max_step_attempts: u32,
    /// Base of the exponential backoff between step attempts.
    #[serde(default = "default_step_base_delay_ms")]
    pub step_base_delay_ms: u64,
    /// Crawl interval for sources without their own.
    #[serde(default = "default_crawl_interval_minutes")]
    pub default_crawl_interval_minutes: u32,
    /// Whether content is PII-redacted before analysis when the source does not say.
    #[serde(default = "default_pii_redaction")]
    pub pii_redaction_default: bool,
    /// A `RUNNING` run with no step activity for this long is failed as abandoned.
    #[serde(default = "default_abandoned_run_minutes")]
    pub abandoned_run_minutes: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sla_hours: SlaHours::default(),
            uncertain_default_risk: default_uncertain_risk(),
            escalation_threshold_hours: default_escalation_threshold_hours(),
            retention_days: default_retention_days(),
            max_step_attempts: default_max_step_attempts(),
            step_base_delay_ms: default_step_base_delay_ms(),
            default_crawl_interval_minutes: default_crawl_interval_minutes(),
            pii_redaction_default: default_pii_redaction(),
            abandoned_run_minutes: default_abandoned_run_minutes(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_step_attempts == 0 {
            return Err(SettingsError::Invalid(
                "max_step_attempts must be at least 1".to_string(),
            ));
        }
        if self.retention_days == 0 {
            return Err(SettingsError::Invalid(
                "retention_days must be at least 1".to_string(),
            ));
        }
        if self.default_crawl_interval_minutes == 0 {
            return Err(SettingsError::Invalid(
                "default_crawl_interval_minutes must be at least 1".to_string(),
            ));
        }
        if self.escalation_threshold_hours == 0 {
            return Err(SettingsError::Invalid(
                "escalation_threshold_hours must be at least 1".to_string(),
            ));
        }
        if self.abandoned_run_minutes == 0 {
            return Err(SettingsError::Invalid(
                "abandoned_run_minutes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_uncertain_risk() -> Severity {
    Severity::Medium
}

fn default_escalation_threshold_hours() -> u32 {
    48
}

fn default_retention_days() -> u32 {
    90
}

fn default_max_step_attempts() -> u32 {
    3
}

fn default_step_base_delay_ms() -> u64 {
    1000
}

fn default_crawl_interval_minutes() -> u32 {
    1440
}

fn default_pii_redaction() -> bool {
    true
}

fn default_abandoned_run_minutes() -> u32 {
    360
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_step_attempts, 3);
        assert_eq!(settings.sla_hours.for_risk(Severity::Critical), 24);
        assert_eq!(settings.sla_hours.for_risk(Severity::Low), 336);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: Settings = toml::from_str(
            r#"
retention_days = 30
uncertain_default_risk = "HIGH"

[sla_hours]
critical = 8
"#,
        )
        .unwrap();
        assert_eq!(settings.retention_days, 30);
        assert_eq!(settings.uncertain_default_risk, Severity::High);
        assert_eq!(settings.sla_hours.critical, 8);
        assert_eq!(settings.sla_hours.high, 72);
        assert_eq!(settings.max_step_attempts, 3);
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let settings = Settings {
            max_step_attempts: 0,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid(_))
        ));
    }
}
