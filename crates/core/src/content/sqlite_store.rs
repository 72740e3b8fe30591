//! SQLite-backed content store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::db::{self, StoreError};

use super::{ContentItem, ContentStore, NormalizedItem, Revision, StoredRevision};

const ITEM_COLUMNS: &str =
    "id, source_id, external_id, url, current_revision_id, first_seen_run_id, created_at, updated_at";
const REVISION_COLUMNS: &str = "id, item_id, run_id, content_key, title, text, url, created_at";

/// SQLite-backed content store.
pub struct SqliteContentStore {
    conn: Mutex<Connection>,
}

impl SqliteContentStore {
    /// Create a new SQLite content store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = db::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite content store (useful for testing).
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
            CREATE TABLE IF NOT EXISTS content_items (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                external_id TEXT NOT NULL,
                url TEXT NOT NULL,
                current_revision_id TEXT,
                first_seen_run_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (source_id, external_id)
            );

            CREATE TABLE IF NOT EXISTS content_revisions (
                id TEXT PRIMARY KEY,
                item_id TEXT NOT NULL,
                run_id TEXT NOT NULL,
                content_key TEXT NOT NULL,
                title TEXT,
                text TEXT NOT NULL,
                url TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_content_revisions_item ON content_revisions(item_id, created_at);
            "#,
        )?;
        Ok(())
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<ContentItem> {
        let created_at: String = row.get(6)?;
        let updated_at: String = row.get(7)?;
        Ok(ContentItem {
            id: row.get(0)?,
            source_id: row.get(1)?,
            external_id: row.get(2)?,
            url: row.get(3)?,
            current_revision_id: row.get(4)?,
            first_seen_run_id: row.get(5)?,
            created_at: db::parse_ts(&created_at)?,
            updated_at: db::parse_ts(&updated_at)?,
        })
    }

    fn row_to_revision(row: &rusqlite::Row) -> rusqlite::Result<Revision> {
        let created_at: String = row.get(7)?;
        Ok(Revision {
            id: row.get(0)?,
            item_id: row.get(1)?,
            run_id: row.get(2)?,
            content_key: row.get(3)?,
            title: row.get(4)?,
            text: row.get(5)?,
            url: row.get(6)?,
            created_at: db::parse_ts(&created_at)?,
        })
    }

    fn select_item(
        tx: &Transaction,
        source_id: &str,
        external_id: &str,
    ) -> Result<Option<ContentItem>, StoreError> {
        let item = tx
            .query_row(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM content_items WHERE source_id = ? AND external_id = ?"
                ),
                params![source_id, external_id],
                Self::row_to_item,
            )
            .optional()?;
        Ok(item)
    }
}

impl ContentStore for SqliteContentStore {
    fn store_revision(
        &self,
        source_id: &str,
        run_id: &str,
        item: &NormalizedItem,
    ) -> Result<StoredRevision, StoreError> {
        let mut conn = db::lock(&self.conn)?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        // Concurrent writers race on the unique key; whoever loses reads the winner's row
        tx.execute(
            &format!(
                "INSERT OR IGNORE INTO content_items ({ITEM_COLUMNS}) VALUES (?, ?, ?, ?, NULL, ?, ?, ?)"
            ),
            params![
                uuid::Uuid::new_v4().to_string(),
                source_id,
                item.external_id,
                item.url,
                run_id,
                db::ts(&now),
                db::ts(&now),
            ],
        )?;

        let stored_item = Self::select_item(&tx, source_id, &item.external_id)?.ok_or_else(|| {
            StoreError::NotFound(format!("content item {}/{}", source_id, item.external_id))
        })?;

        let current = match &stored_item.current_revision_id {
            Some(revision_id) => tx
                .query_row(
                    &format!("SELECT {REVISION_COLUMNS} FROM content_revisions WHERE id = ?"),
                    params![revision_id],
                    Self::row_to_revision,
                )
                .optional()?,
            None => None,
        };

        let revision = match current {
            Some(revision) if revision.content_key == item.content_key => revision,
            _ => {
                let revision = Revision {
                    id: uuid::Uuid::new_v4().to_string(),
                    item_id: stored_item.id.clone(),
                    run_id: run_id.to_string(),
                    content_key: item.content_key.clone(),
                    title: item.title.clone(),
                    text: item.text.clone(),
                    url: item.url.clone(),
                    created_at: now,
                };
                tx.execute(
                    &format!(
                        "INSERT INTO content_revisions ({REVISION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
                    ),
                    params![
                        revision.id,
                        revision.item_id,
                        revision.run_id,
                        revision.content_key,
                        revision.title,
                        revision.text,
                        revision.url,
                        db::ts(&revision.created_at),
                    ],
                )?;
                revision
            }
        };

        tx.execute(
            "UPDATE content_items SET current_revision_id = ?, url = ?, updated_at = ? WHERE id = ?",
            params![revision.id, item.url, db::ts(&now), stored_item.id],
        )?;
        tx.commit()?;

        Ok(StoredRevision {
            item_id: stored_item.id,
            is_new_item: stored_item.first_seen_run_id == run_id,
            created_revision: revision.run_id == run_id,
            revision,
        })
    }

    fn find_item(
        &self,
        source_id: &str,
        external_id: &str,
    ) -> Result<Option<ContentItem>, StoreError> {
        let conn = db::lock(&self.conn)?;
        let item = conn
            .query_row(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM content_items WHERE source_id = ? AND external_id = ?"
                ),
                params![source_id, external_id],
                Self::row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    fn get_revision(&self, id: &str) -> Result<Option<Revision>, StoreError> {
        let conn = db::lock(&self.conn)?;
        let revision = conn
            .query_row(
                &format!("SELECT {REVISION_COLUMNS} FROM content_revisions WHERE id = ?"),
                params![id],
                Self::row_to_revision,
            )
            .optional()?;
        Ok(revision)
    }

    fn list_revisions(&self, item_id: &str) -> Result<Vec<Revision>, StoreError> {
        let conn = db::lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REVISION_COLUMNS} FROM content_revisions WHERE item_id = ? ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![item_id], Self::row_to_revision)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }
}
