//! Settings provider trait and the fixed in-process provider.

use std::sync::RwLock;

use thiserror::Error;

use crate::db::StoreError;

use super::Settings;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Settings store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Supplies the current settings.
pub trait SettingsProvider: Send + Sync {
    /// Read the settings as they are now.
    fn current(&self) -> Result<Settings, SettingsError>;
}

/// Settings held in memory, replaceable at runtime (useful for testing).
pub struct StaticSettings {
    settings: RwLock<Settings>,
}

impl StaticSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    /// Replace the settings seen by later readers.
    pub fn set(&self, settings: Settings) -> Result<(), SettingsError> {
        settings.validate()?;
        let mut guard = self
            .settings
            .write()
            .map_err(|_| SettingsError::Store(StoreError::Poisoned))?;
        *guard = settings;
        Ok(())
    }
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl SettingsProvider for StaticSettings {
    fn current(&self) -> Result<Settings, SettingsError> {
        self.settings
            .read()
            .map(|s| s.clone())
            .map_err(|_| SettingsError::Store(StoreError::Poisoned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_settings_are_reread() {
        let provider = StaticSettings::default();
        assert_eq!(provider.current().unwrap().retention_days, 90);

        provider
            .set(Settings {
                retention_days: 7,
                ..Settings::default()
            })
            .unwrap();
        assert_eq!(provider.current().unwrap().retention_days, 7);
    }

    #[test]
    fn test_set_rejects_invalid() {
        let provider = StaticSettings::default();
        let result = provider.set(Settings {
            retention_days: 0,
            ..Settings::default()
        });
        assert!(result.is_err());
        assert_eq!(provider.current().unwrap().retention_days, 90);
    }
}
