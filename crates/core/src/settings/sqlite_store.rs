//! SQLite-backed settings store.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{self, StoreError};

use super::{Settings, SettingsError, SettingsProvider};

/// Settings kept as one JSON document in a single-row table, so every worker
/// sharing the database sees an operator's change on its next read.
pub struct SqliteSettingsStore {
    conn: Mutex<Connection>,
}

impl SqliteSettingsStore {
    /// Create a new SQLite settings store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = db::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite settings store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = db::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Store `settings` unless settings already exist.
    ///
    /// Returns true if the seed was written.
    pub fn seed(&self, settings: &Settings) -> Result<bool, SettingsError> {
        settings.validate()?;
        let conn = db::lock(&self.conn)?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO settings (id, data, updated_at) VALUES (1, ?, ?)",
                params![
                    serde_json::to_string(settings).map_err(StoreError::from)?,
                    db::ts(&Utc::now())
                ],
            )
            .map_err(StoreError::from)?;
        Ok(inserted > 0)
    }

    /// Replace the stored settings.
    pub fn update(&self, settings: &Settings) -> Result<(), SettingsError> {
        settings.validate()?;
        let conn = db::lock(&self.conn)?;
        conn.execute(
            "INSERT INTO settings (id, data, updated_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET data = ?1, updated_at = ?2",
            params![
                serde_json::to_string(settings).map_err(StoreError::from)?,
                db::ts(&Utc::now())
            ],
        )
        .map_err(StoreError::from)?;
        Ok(())
    }
}

impl SettingsProvider for SqliteSettingsStore {
    fn current(&self) -> Result<Settings, SettingsError> {
        let conn = db::lock(&self.conn)?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM settings WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(StoreError::from)?;

        match data {
            Some(json) => Ok(serde_json::from_str(&json).map_err(StoreError::from)?),
            None => Ok(Settings::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Severity;

    #[test]
    fn test_unseeded_store_returns_defaults() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        assert_eq!(store.current().unwrap(), Settings::default());
    }

    #[test]
    fn test_seed_does_not_overwrite() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        let first = Settings {
            retention_days: 30,
            ..Settings::default()
        };
        let second = Settings {
            retention_days: 60,
            ..Settings::default()
        };

        assert!(store.seed(&first).unwrap());
        assert!(!store.seed(&second).unwrap());
        assert_eq!(store.current().unwrap().retention_days, 30);
    }

    #[test]
    fn test_update_replaces() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        store.seed(&Settings::default()).unwrap();

        let mut changed = Settings::default();
        changed.uncertain_default_risk = Severity::Critical;
        changed.sla_hours.critical = 4;
        store.update(&changed).unwrap();

        let current = store.current().unwrap();
        assert_eq!(current.uncertain_default_risk, Severity::Critical);
        assert_eq!(current.sla_hours.critical, 4);
    }
}
