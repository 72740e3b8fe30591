//! SQLite-backed source store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{self, StoreError};

use super::{CreateSourceRequest, FetchParams, Source, SourceStore};

const COLUMNS: &str =
    "id, name, channel, country, fetch_params, enabled, crawl_interval_minutes, redact_pii, created_at";

/// SQLite-backed source store.
pub struct SqliteSourceStore {
    conn: Mutex<Connection>,
}

impl SqliteSourceStore {
    /// Create a new SQLite source store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = db::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite source store (useful for testing).
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
            CREATE TABLE IF NOT EXISTS sources (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                channel TEXT NOT NULL,
                country TEXT NOT NULL,
                fetch_params TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                crawl_interval_minutes INTEGER,
                redact_pii INTEGER,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sources_enabled ON sources(enabled);
            "#,
        )?;
        Ok(())
    }

    fn row_to_source(row: &rusqlite::Row) -> rusqlite::Result<Source> {
        let fetch_json: String = row.get(4)?;
        let created_at: String = row.get(8)?;
        Ok(Source {
            id: row.get(0)?,
            name: row.get(1)?,
            channel: row.get(2)?,
            country: row.get(3)?,
            fetch: db::parse_json::<FetchParams>(&fetch_json)?,
            enabled: row.get(5)?,
            crawl_interval_minutes: row.get(6)?,
            redact_pii: row.get(7)?,
            created_at: db::parse_ts(&created_at)?,
        })
    }
}

impl SourceStore for SqliteSourceStore {
    fn create(&self, request: CreateSourceRequest) -> Result<Source, StoreError> {
        let conn = db::lock(&self.conn)?;

        let source = Source {
            id: uuid::Uuid::new_v4().to_string(),
            name: request.name,
            channel: request.channel,
            country: request.country,
            fetch: request.fetch,
            enabled: request.enabled,
            crawl_interval_minutes: request.crawl_interval_minutes,
            redact_pii: request.redact_pii,
            created_at: Utc::now(),
        };

        conn.execute(
            &format!("INSERT INTO sources ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                source.id,
                source.name,
                source.channel,
                source.country,
                serde_json::to_string(&source.fetch)?,
                source.enabled,
                source.crawl_interval_minutes,
                source.redact_pii,
                db::ts(&source.created_at),
            ],
        )?;

        Ok(source)
    }

    fn get(&self, id: &str) -> Result<Option<Source>, StoreError> {
        let conn = db::lock(&self.conn)?;
        let source = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM sources WHERE id = ?"),
                params![id],
                Self::row_to_source,
            )
            .optional()?;
        Ok(source)
    }

    fn list_enabled(&self) -> Result<Vec<Source>, StoreError> {
        let conn = db::lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM sources WHERE enabled = 1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map([], Self::row_to_source)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }
}
