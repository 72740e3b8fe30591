//! SQLite-backed ticket store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde_json::json;

use crate::analysis::Severity;
use crate::db::{self, StoreError};

use super::{
    EscalationLevel, NewTicket, Ticket, TicketEvent, TicketEventKind, TicketFilter, TicketStatus,
    TicketStore,
};

const COLUMNS: &str = "id, idempotency_key, revision_id, content_item_id, source_id, analysis_id, title, status, risk_level, escalation_level, due_at, overdue, created_at, updated_at";
const EVENT_COLUMNS: &str = "id, ticket_id, kind, detail, created_at";

/// SQLite-backed ticket store.
pub struct SqliteTicketStore {
    conn: Mutex<Connection>,
}

impl SqliteTicketStore {
    /// Create a new SQLite ticket store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = db::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite ticket store (useful for testing).
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
            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                idempotency_key TEXT NOT NULL UNIQUE,
                revision_id TEXT NOT NULL,
                content_item_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                analysis_id TEXT NOT NULL,
                title TEXT NOT NULL,
                status TEXT NOT NULL,
                risk_level TEXT NOT NULL,
                escalation_level TEXT NOT NULL,
                due_at TEXT NOT NULL,
                overdue INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ticket_events (
                id TEXT PRIMARY KEY,
                ticket_id TEXT NOT NULL REFERENCES tickets(id),
                kind TEXT NOT NULL,
                detail TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_status_updated ON tickets(status, updated_at);
            CREATE INDEX IF NOT EXISTS idx_tickets_due_at ON tickets(due_at);
            CREATE INDEX IF NOT EXISTS idx_ticket_events_ticket ON ticket_events(ticket_id, created_at);
            "#,
        )?;
        Ok(())
    }

    fn build_where_clause(filter: &TicketFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(level) = filter.escalation_level {
            conditions.push("escalation_level = ?");
            params.push(Box::new(level.as_str()));
        }

        if let Some(ref source_id) = filter.source_id {
            conditions.push("source_id = ?");
            params.push(Box::new(source_id.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
        let status: String = row.get(7)?;
        let risk_level: String = row.get(8)?;
        let escalation_level: String = row.get(9)?;
        let due_at: String = row.get(10)?;
        let created_at: String = row.get(12)?;
        let updated_at: String = row.get(13)?;

        Ok(Ticket {
            id: row.get(0)?,
            idempotency_key: row.get(1)?,
            revision_id: row.get(2)?,
            content_item_id: row.get(3)?,
            source_id: row.get(4)?,
            analysis_id: row.get(5)?,
            title: row.get(6)?,
            status: TicketStatus::parse(&status).unwrap_or(TicketStatus::Open),
            risk_level: Severity::parse(&risk_level).unwrap_or(Severity::Medium),
            escalation_level: EscalationLevel::parse(&escalation_level)
                .unwrap_or(EscalationLevel::Local),
            due_at: db::parse_ts(&due_at)?,
            overdue: row.get(11)?,
            created_at: db::parse_ts(&created_at)?,
            updated_at: db::parse_ts(&updated_at)?,
        })
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<TicketEvent> {
        let kind: String = row.get(2)?;
        let detail: String = row.get(3)?;
        let created_at: String = row.get(4)?;
        Ok(TicketEvent {
            id: row.get(0)?,
            ticket_id: row.get(1)?,
            kind: TicketEventKind::parse(&kind).unwrap_or(TicketEventKind::Created),
            detail: db::parse_json(&detail)?,
            created_at: db::parse_ts(&created_at)?,
        })
    }

    fn select_by(conn: &Connection, column: &str, value: &str) -> Result<Option<Ticket>, StoreError> {
        let ticket = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM tickets WHERE {column} = ?"),
                params![value],
                Self::row_to_ticket,
            )
            .optional()?;
        Ok(ticket)
    }

    fn insert_event(
        tx: &Transaction,
        ticket_id: &str,
        kind: TicketEventKind,
        detail: serde_json::Value,
        now: &DateTime<Utc>,
    ) -> Result<(), StoreError> {
        tx.execute(
            &format!("INSERT INTO ticket_events ({EVENT_COLUMNS}) VALUES (?, ?, ?, ?, ?)"),
            params![
                uuid::Uuid::new_v4().to_string(),
                ticket_id,
                kind.as_str(),
                serde_json::to_string(&detail)?,
                db::ts(now),
            ],
        )?;
        Ok(())
    }

    fn query_tickets(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Ticket>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, Self::row_to_ticket)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }
}

impl TicketStore for SqliteTicketStore {
    fn create_if_absent(&self, request: NewTicket) -> Result<Option<Ticket>, StoreError> {
        let mut conn = db::lock(&self.conn)?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        let ticket = Ticket {
            id: uuid::Uuid::new_v4().to_string(),
            idempotency_key: request.idempotency_key,
            revision_id: request.revision_id,
            content_item_id: request.content_item_id,
            source_id: request.source_id,
            analysis_id: request.analysis_id,
            title: request.title,
            status: TicketStatus::Open,
            risk_level: request.risk_level,
            escalation_level: EscalationLevel::Local,
            due_at: request.due_at,
            overdue: false,
            created_at: now,
            updated_at: now,
        };

        let inserted = tx.execute(
            &format!(
                "INSERT OR IGNORE INTO tickets ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                ticket.id,
                ticket.idempotency_key,
                ticket.revision_id,
                ticket.content_item_id,
                ticket.source_id,
                ticket.analysis_id,
                ticket.title,
                ticket.status.as_str(),
                ticket.risk_level.as_str(),
                ticket.escalation_level.as_str(),
                db::ts(&ticket.due_at),
                ticket.overdue,
                db::ts(&ticket.created_at),
                db::ts(&ticket.updated_at),
            ],
        )?;

        if inserted == 0 {
            return Ok(None);
        }

        Self::insert_event(
            &tx,
            &ticket.id,
            TicketEventKind::Created,
            json!({
                "risk_level": ticket.risk_level.as_str(),
                "due_at": db::ts(&ticket.due_at),
                "analysis_id": ticket.analysis_id,
            }),
            &now,
        )?;
        tx.commit()?;

        Ok(Some(ticket))
    }

    fn get(&self, id: &str) -> Result<Option<Ticket>, StoreError> {
        let conn = db::lock(&self.conn)?;
        Self::select_by(&conn, "id", id)
    }

    fn find_by_key(&self, idempotency_key: &str) -> Result<Option<Ticket>, StoreError> {
        let conn = db::lock(&self.conn)?;
        Self::select_by(&conn, "idempotency_key", idempotency_key)
    }

    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        let conn = db::lock(&self.conn)?;
        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {COLUMNS} FROM tickets {} ORDER BY created_at ASC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        Self::query_tickets(&conn, &sql, &param_refs)
    }

    fn count(&self, filter: &TicketFilter) -> Result<i64, StoreError> {
        let conn = db::lock(&self.conn)?;
        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!("SELECT COUNT(*) FROM tickets {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    fn list_events(&self, ticket_id: &str) -> Result<Vec<TicketEvent>, StoreError> {
        let conn = db::lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM ticket_events WHERE ticket_id = ? ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(params![ticket_id], Self::row_to_event)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    fn update_status(&self, id: &str, status: TicketStatus) -> Result<Ticket, StoreError> {
        let conn = db::lock(&self.conn)?;
        let updated = conn.execute(
            "UPDATE tickets SET status = ?, updated_at = ? WHERE id = ?",
            params![status.as_str(), db::ts(&Utc::now()), id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("ticket {}", id)));
        }
        Self::select_by(&conn, "id", id)?.ok_or_else(|| StoreError::NotFound(format!("ticket {}", id)))
    }

    fn escalation_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<Ticket>, StoreError> {
        let conn = db::lock(&self.conn)?;
        Self::query_tickets(
            &conn,
            &format!(
                "SELECT {COLUMNS} FROM tickets
                 WHERE status IN (?, ?) AND escalation_level != ? AND updated_at < ?
                 ORDER BY updated_at ASC"
            ),
            params![
                TicketStatus::Open.as_str(),
                TicketStatus::InProgress.as_str(),
                EscalationLevel::Global.as_str(),
                db::ts(&cutoff),
            ],
        )
    }

    fn escalate(
        &self,
        id: &str,
        from: EscalationLevel,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError> {
        let Some(to) = from.next() else {
            return Ok(None);
        };

        let mut conn = db::lock(&self.conn)?;
        let tx = conn.transaction()?;

        // Conditional on the expected level so overlapping sweeps move a ticket once
        let updated = tx.execute(
            "UPDATE tickets SET escalation_level = ?, updated_at = ?
             WHERE id = ? AND escalation_level = ? AND status IN (?, ?)",
            params![
                to.as_str(),
                db::ts(&now),
                id,
                from.as_str(),
                TicketStatus::Open.as_str(),
                TicketStatus::InProgress.as_str(),
            ],
        )?;
        if updated == 0 {
            return Ok(None);
        }

        Self::insert_event(
            &tx,
            id,
            TicketEventKind::Escalated,
            json!({ "from": from.as_str(), "to": to.as_str() }),
            &now,
        )?;
        let ticket = Self::select_by(&tx, "id", id)?;
        tx.commit()?;

        Ok(ticket)
    }

    fn overdue_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Ticket>, StoreError> {
        let conn = db::lock(&self.conn)?;
        Self::query_tickets(
            &conn,
            &format!(
                "SELECT {COLUMNS} FROM tickets
                 WHERE status IN (?, ?) AND overdue = 0 AND due_at < ?
                 ORDER BY due_at ASC"
            ),
            params![
                TicketStatus::Open.as_str(),
                TicketStatus::InProgress.as_str(),
                db::ts(&now),
            ],
        )
    }

    fn mark_overdue(&self, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut conn = db::lock(&self.conn)?;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE tickets SET overdue = 1 WHERE id = ? AND overdue = 0",
            params![id],
        )?;
        if updated == 0 {
            return Ok(false);
        }

        Self::insert_event(
            &tx,
            id,
            TicketEventKind::MarkedOverdue,
            json!({ "marked_at": db::ts(&now) }),
            &now,
        )?;
        tx.commit()?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn create_test_store() -> SqliteTicketStore {
        SqliteTicketStore::in_memory().expect("Failed to create in-memory store")
    }

    fn new_ticket(revision_id: &str, due_at: DateTime<Utc>) -> NewTicket {
        NewTicket {
            idempotency_key: Ticket::key_for_revision(revision_id),
            revision_id: revision_id.to_string(),
            content_item_id: "item-1".to_string(),
            source_id: "src-1".to_string(),
            analysis_id: "analysis-1".to_string(),
            title: "Compliance review: Savings".to_string(),
            risk_level: Severity::High,
            due_at,
        }
    }

    #[test]
    fn test_create_if_absent_is_idempotent() {
        let store = create_test_store();
        let due = Utc::now() + Duration::hours(24);

        let first = store.create_if_absent(new_ticket("rev-1", due)).unwrap();
        let second = store.create_if_absent(new_ticket("rev-1", due)).unwrap();

        let ticket = first.expect("first call creates");
        assert!(second.is_none());
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.escalation_level, EscalationLevel::Local);
        assert_eq!(store.count(&TicketFilter::new()).unwrap(), 1);

        let events = store.list_events(&ticket.id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TicketEventKind::Created);
        assert_eq!(events[0].detail["risk_level"], "HIGH");
    }

    #[test]
    fn test_find_by_key() {
        let store = create_test_store();
        let created = store
            .create_if_absent(new_ticket("rev-1", Utc::now()))
            .unwrap()
            .unwrap();

        let found = store.find_by_key("revision:rev-1").unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(store.find_by_key("revision:other").unwrap().is_none());
    }

    #[test]
    fn test_escalate_moves_one_tier() {
        let store = create_test_store();
        let ticket = store
            .create_if_absent(new_ticket("rev-1", Utc::now() + Duration::days(3)))
            .unwrap()
            .unwrap();
        let now = Utc::now();

        let escalated = store
            .escalate(&ticket.id, EscalationLevel::Local, now)
            .unwrap()
            .unwrap();
        assert_eq!(escalated.escalation_level, EscalationLevel::Regional);
        assert!(escalated.updated_at >= ticket.updated_at);

        // A stale view of the ticket does not move it again
        assert!(store
            .escalate(&ticket.id, EscalationLevel::Local, now)
            .unwrap()
            .is_none());

        let events = store.list_events(&ticket.id).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, TicketEventKind::Escalated);
        assert_eq!(events[1].detail["to"], "REGIONAL");
    }

    #[test]
    fn test_escalation_candidates() {
        let store = create_test_store();
        let a = store
            .create_if_absent(new_ticket("rev-a", Utc::now()))
            .unwrap()
            .unwrap();
        let b = store
            .create_if_absent(new_ticket("rev-b", Utc::now()))
            .unwrap()
            .unwrap();
        store.update_status(&b.id, TicketStatus::Resolved).unwrap();

        let future = Utc::now() + Duration::hours(1);
        let candidates = store.escalation_candidates(future).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, a.id);

        let past = Utc::now() - Duration::hours(1);
        assert!(store.escalation_candidates(past).unwrap().is_empty());
    }

    #[test]
    fn test_global_tickets_are_not_candidates() {
        let store = create_test_store();
        let ticket = store
            .create_if_absent(new_ticket("rev-1", Utc::now()))
            .unwrap()
            .unwrap();
        let now = Utc::now();
        store.escalate(&ticket.id, EscalationLevel::Local, now).unwrap();
        store
            .escalate(&ticket.id, EscalationLevel::Regional, now)
            .unwrap();

        let future = Utc::now() + Duration::hours(1);
        assert!(store.escalation_candidates(future).unwrap().is_empty());
        assert!(store
            .escalate(&ticket.id, EscalationLevel::Global, now)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_mark_overdue_once() {
        let store = create_test_store();
        let now = Utc::now();
        let late = store
            .create_if_absent(new_ticket("rev-late", now - Duration::hours(1)))
            .unwrap()
            .unwrap();
        store
            .create_if_absent(new_ticket("rev-ok", now + Duration::hours(1)))
            .unwrap();

        let candidates = store.overdue_candidates(now).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, late.id);

        assert!(store.mark_overdue(&late.id, now).unwrap());
        assert!(!store.mark_overdue(&late.id, now).unwrap());
        assert!(store.overdue_candidates(now).unwrap().is_empty());

        let loaded = store.get(&late.id).unwrap().unwrap();
        assert!(loaded.overdue);
        assert_eq!(
            loaded.updated_at.timestamp_micros(),
            late.updated_at.timestamp_micros()
        );
    }

    #[test]
    fn test_list_with_filter() {
        let store = create_test_store();
        for i in 0..3 {
            store
                .create_if_absent(new_ticket(&format!("rev-{}", i), Utc::now()))
                .unwrap();
        }

        let open = TicketFilter::new().with_status(TicketStatus::Open);
        assert_eq!(store.list(&open).unwrap().len(), 3);
        assert_eq!(store.list(&open.clone().with_limit(2)).unwrap().len(), 2);

        let local = TicketFilter::new()
            .with_escalation_level(EscalationLevel::Local)
            .with_source("src-1");
        assert_eq!(store.count(&local).unwrap(), 3);
        assert_eq!(
            store
                .count(&TicketFilter::new().with_source("other"))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_update_status_missing_ticket() {
        let store = create_test_store();
        assert!(matches!(
            store.update_status("missing", TicketStatus::Closed),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_file_based_store() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("tickets.db");

        let id = {
            let store = SqliteTicketStore::new(&db_path).unwrap();
            store
                .create_if_absent(new_ticket("rev-1", Utc::now()))
                .unwrap()
                .unwrap()
                .id
        };

        let store = SqliteTicketStore::new(&db_path).unwrap();
        assert!(store.get(&id).unwrap().is_some());
    }
}
