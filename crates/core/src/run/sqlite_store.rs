//! SQLite-backed run store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{self, StoreError};

use super::{Run, RunCounters, RunStatus, RunStore, RunTrigger, StepRecord, STEP_COUNT};

const COLUMNS: &str = "id, source_id, trigger, status, steps, cancel_requested, counters, error, created_at, started_at, finished_at";

/// SQLite-backed run store.
///
/// The step records live in a single JSON column so the whole ordered array is
/// written and read back as one unit.
pub struct SqliteRunStore {
    conn: Mutex<Connection>,
}

impl SqliteRunStore {
    /// Create a new SQLite run store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = db::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite run store (useful for testing).
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
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                trigger TEXT NOT NULL,
                status TEXT NOT NULL,
                steps TEXT NOT NULL,
                cancel_requested INTEGER NOT NULL DEFAULT 0,
                counters TEXT NOT NULL,
                error TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_runs_source_created ON runs(source_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);
            CREATE INDEX IF NOT EXISTS idx_runs_finished_at ON runs(finished_at);
            "#,
        )?;
        Ok(())
    }

    fn write_progress(conn: &Connection, run: &Run) -> Result<usize, StoreError> {
        let updated = conn.execute(
            "UPDATE runs SET status = ?, steps = ?, counters = ?, error = ?, started_at = ?, finished_at = ? WHERE id = ?",
            params![
                run.status.as_str(),
                serde_json::to_string(&run.steps)?,
                serde_json::to_string(&run.counters)?,
                run.error,
                run.started_at.as_ref().map(db::ts),
                run.finished_at.as_ref().map(db::ts),
                run.id,
            ],
        )?;
        Ok(updated)
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<Run> {
        let trigger: String = row.get(2)?;
        let status: String = row.get(3)?;
        let steps_json: String = row.get(4)?;
        let counters_json: String = row.get(6)?;
        let created_at: String = row.get(8)?;

        let steps: [StepRecord; STEP_COUNT] = db::parse_json(&steps_json)?;
        let counters: RunCounters = db::parse_json(&counters_json)?;

        Ok(Run {
            id: row.get(0)?,
            source_id: row.get(1)?,
            // Unknown values only appear if the table was edited by hand
            trigger: RunTrigger::parse(&trigger).unwrap_or(RunTrigger::Manual),
            status: RunStatus::parse(&status).unwrap_or(RunStatus::Failed),
            steps,
            cancel_requested: row.get(5)?,
            counters,
            error: row.get(7)?,
            created_at: db::parse_ts(&created_at)?,
            started_at: db::parse_opt_ts(row.get(9)?)?,
            finished_at: db::parse_opt_ts(row.get(10)?)?,
        })
    }
}

impl RunStore for SqliteRunStore {
    fn create(&self, source_id: &str, trigger: RunTrigger) -> Result<Run, StoreError> {
        let conn = db::lock(&self.conn)?;
        let run = Run::new(uuid::Uuid::new_v4().to_string(), source_id, trigger);

        conn.execute(
            &format!("INSERT INTO runs ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                run.id,
                run.source_id,
                run.trigger.as_str(),
                run.status.as_str(),
                serde_json::to_string(&run.steps)?,
                run.cancel_requested,
                serde_json::to_string(&run.counters)?,
                run.error,
                db::ts(&run.created_at),
                run.started_at.as_ref().map(db::ts),
                run.finished_at.as_ref().map(db::ts),
            ],
        )?;

        Ok(run)
    }

    fn get(&self, id: &str) -> Result<Option<Run>, StoreError> {
        let conn = db::lock(&self.conn)?;
        let run = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM runs WHERE id = ?"),
                params![id],
                Self::row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    fn save_progress(&self, run: &Run) -> Result<(), StoreError> {
        let conn = db::lock(&self.conn)?;
        if Self::write_progress(&conn, run)? == 0 {
            return Err(StoreError::NotFound(format!("run {}", run.id)));
        }
        Ok(())
    }

    fn request_cancel(&self, id: &str) -> Result<bool, StoreError> {
        let conn = db::lock(&self.conn)?;
        let updated = conn.execute(
            "UPDATE runs SET cancel_requested = 1 WHERE id = ? AND status = ?",
            params![id, RunStatus::Running.as_str()],
        )?;
        Ok(updated > 0)
    }

    fn is_cancel_requested(&self, id: &str) -> Result<bool, StoreError> {
        let conn = db::lock(&self.conn)?;
        let flag: Option<bool> = conn
            .query_row(
                "SELECT cancel_requested FROM runs WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        flag.ok_or_else(|| StoreError::NotFound(format!("run {}", id)))
    }

    fn latest_for_source(&self, source_id: &str) -> Result<Option<Run>, StoreError> {
        let conn = db::lock(&self.conn)?;
        let run = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM runs WHERE source_id = ? ORDER BY created_at DESC LIMIT 1"
                ),
                params![source_id],
                Self::row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    fn has_running(&self, source_id: &str) -> Result<bool, StoreError> {
        let conn = db::lock(&self.conn)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE source_id = ? AND status = ?",
            params![source_id, RunStatus::Running.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn list_for_source(&self, source_id: &str, limit: i64) -> Result<Vec<Run>, StoreError> {
        let conn = db::lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM runs WHERE source_id = ? ORDER BY created_at DESC LIMIT ?"
        ))?;
        let rows = stmt.query_map(params![source_id, limit], Self::row_to_run)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    fn fail_stale(&self, cutoff: DateTime<Utc>, reason: &str) -> Result<Vec<Run>, StoreError> {
        let conn = db::lock(&self.conn)?;
        let running = {
            let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM runs WHERE status = ?"))?;
            let rows = stmt.query_map(params![RunStatus::Running.as_str()], Self::row_to_run)?;
            let running = rows.collect::<Result<Vec<_>, _>>()?;
            running
        };

        let now = Utc::now();
        let mut failed = Vec::new();
        for mut run in running {
            if run.last_activity() >= cutoff {
                continue;
            }
            run.abandon(reason, now);
            Self::write_progress(&conn, &run)?;
            failed.push(run);
        }
        Ok(failed)
    }

    fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let conn = db::lock(&self.conn)?;
        let deleted = conn.execute(
            "DELETE FROM runs WHERE status != ? AND finished_at IS NOT NULL AND finished_at < ?",
            params![RunStatus::Running.as_str(), db::ts(&cutoff)],
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{PipelineStep, StepStatus};
    use chrono::Duration;

    #[test]
    fn test_create_and_get() {
        let store = SqliteRunStore::in_memory().unwrap();
        let run = store.create("src-1", RunTrigger::Scheduled).unwrap();

        let loaded = store.get(&run.id).unwrap().expect("run exists");
        assert_eq!(loaded.source_id, "src-1");
        assert_eq!(loaded.status, RunStatus::Running);
        assert_eq!(loaded.trigger, RunTrigger::Scheduled);
        assert!(loaded
            .steps
            .iter()
            .all(|s| s.status == StepStatus::Pending));
    }

    #[test]
    fn test_save_progress_roundtrips_steps() {
        let store = SqliteRunStore::in_memory().unwrap();
        let mut run = store.create("src-1", RunTrigger::Manual).unwrap();

        let now = Utc::now();
        run.started_at = Some(now);
        run.step_mut(PipelineStep::Start).begin_attempt(now);
        run.step_mut(PipelineStep::Start).succeed(now);
        run.counters.fetched = 4;
        store.save_progress(&run).unwrap();

        let loaded = store.get(&run.id).unwrap().unwrap();
        assert_eq!(loaded.step(PipelineStep::Start).status, StepStatus::Succeeded);
        assert_eq!(loaded.step(PipelineStep::Start).attempts, 1);
        assert_eq!(loaded.counters.fetched, 4);
        assert!(loaded.started_at.is_some());
    }

    #[test]
    fn test_save_progress_preserves_cancel_flag() {
        let store = SqliteRunStore::in_memory().unwrap();
        let run = store.create("src-1", RunTrigger::Manual).unwrap();

        assert!(store.request_cancel(&run.id).unwrap());
        // The orchestrator still holds a copy without the flag
        store.save_progress(&run).unwrap();

        assert!(store.is_cancel_requested(&run.id).unwrap());
    }

    #[test]
    fn test_request_cancel_ignores_terminal_runs() {
        let store = SqliteRunStore::in_memory().unwrap();
        let mut run = store.create("src-1", RunTrigger::Manual).unwrap();
        run.fail_at(PipelineStep::Start, "boom", Utc::now());
        store.save_progress(&run).unwrap();

        assert!(!store.request_cancel(&run.id).unwrap());
        assert!(!store.request_cancel("missing").unwrap());
    }

    #[test]
    fn test_is_cancel_requested_missing_run() {
        let store = SqliteRunStore::in_memory().unwrap();
        assert!(matches!(
            store.is_cancel_requested("missing"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_latest_and_running() {
        let store = SqliteRunStore::in_memory().unwrap();
        assert!(store.latest_for_source("src-1").unwrap().is_none());
        assert!(!store.has_running("src-1").unwrap());

        let mut first = store.create("src-1", RunTrigger::Scheduled).unwrap();
        first.fail_at(PipelineStep::Fetch, "down", Utc::now());
        store.save_progress(&first).unwrap();
        assert!(!store.has_running("src-1").unwrap());

        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = store.create("src-1", RunTrigger::Manual).unwrap();

        let latest = store.latest_for_source("src-1").unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert!(store.has_running("src-1").unwrap());
        assert_eq!(store.list_for_source("src-1", 10).unwrap().len(), 2);
    }

    #[test]
    fn test_fail_stale_only_touches_idle_running_runs() {
        let store = SqliteRunStore::in_memory().unwrap();
        let now = Utc::now();

        let mut idle = store.create("src-1", RunTrigger::Scheduled).unwrap();
        idle.started_at = Some(now - Duration::hours(8));
        idle.step_mut(PipelineStep::Start).begin_attempt(now - Duration::hours(8));
        idle.step_mut(PipelineStep::Start).succeed(now - Duration::hours(8));
        idle.step_mut(PipelineStep::Fetch).begin_attempt(now - Duration::hours(8));
        store.save_progress(&idle).unwrap();

        let mut finished = store.create("src-2", RunTrigger::Scheduled).unwrap();
        finished.fail_at(PipelineStep::Start, "x", now - Duration::hours(8));
        store.save_progress(&finished).unwrap();

        // Created just now, so it counts as active under the cutoff below.
        let active = store.create("src-3", RunTrigger::Manual).unwrap();

        let failed = store
            .fail_stale(now - Duration::hours(6), "abandoned")
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, idle.id);

        let idle = store.get(&idle.id).unwrap().unwrap();
        assert_eq!(idle.status, RunStatus::Failed);
        assert_eq!(idle.error.as_deref(), Some("abandoned"));
        assert_eq!(idle.step(PipelineStep::Start).status, StepStatus::Succeeded);
        assert_eq!(idle.step(PipelineStep::Fetch).status, StepStatus::Failed);
        assert!(idle.has_valid_step_sequence());
        assert!(!store.has_running("src-1").unwrap());

        assert_eq!(
            store.get(&finished.id).unwrap().unwrap().error.as_deref(),
            Some("x")
        );
        assert!(store.has_running("src-3").unwrap());
        assert_eq!(store.get(&active.id).unwrap().unwrap().status, RunStatus::Running);
    }

    #[test]
    fn test_delete_finished_before_keeps_running_and_recent() {
        let store = SqliteRunStore::in_memory().unwrap();
        let now = Utc::now();

        let mut old = store.create("src-1", RunTrigger::Scheduled).unwrap();
        old.fail_at(PipelineStep::Start, "x", now - Duration::days(40));
        store.save_progress(&old).unwrap();

        let mut recent = store.create("src-1", RunTrigger::Scheduled).unwrap();
        recent.fail_at(PipelineStep::Start, "x", now - Duration::days(1));
        store.save_progress(&recent).unwrap();

        let running = store.create("src-1", RunTrigger::Scheduled).unwrap();

        let deleted = store
            .delete_finished_before(now - Duration::days(30))
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get(&old.id).unwrap().is_none());
        assert!(store.get(&recent.id).unwrap().is_some());
        assert!(store.get(&running.id).unwrap().is_some());
    }
}
