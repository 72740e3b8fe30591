//! SQLite-backed rule and analysis stores.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{self, StoreError};

use super::{
    AnalysisResult, AnalysisStore, ComplianceRule, ComplianceStatus, CreateRuleRequest,
    NewAnalysis, RuleStore, Severity, Violation,
};

const RULE_COLUMNS: &str = "id, version_id, channel, country, title, description, severity, active";
const ANALYSIS_COLUMNS: &str =
    "id, revision_id, status, language, confidence, violations, reason, created_at";

/// SQLite-backed compliance rule store.
pub struct SqliteRuleStore {
    conn: Mutex<Connection>,
}

impl SqliteRuleStore {
    /// Create a new SQLite rule store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = db::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite rule store (useful for testing).
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
            CREATE TABLE IF NOT EXISTS compliance_rules (
                id TEXT PRIMARY KEY,
                version_id TEXT NOT NULL,
                channel TEXT NOT NULL,
                country TEXT,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                severity TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_compliance_rules_channel ON compliance_rules(channel, active);
            "#,
        )?;
        Ok(())
    }

    fn row_to_rule(row: &rusqlite::Row) -> rusqlite::Result<ComplianceRule> {
        let severity: String = row.get(6)?;
        Ok(ComplianceRule {
            id: row.get(0)?,
            version_id: row.get(1)?,
            channel: row.get(2)?,
            country: row.get(3)?,
            title: row.get(4)?,
            description: row.get(5)?,
            severity: Severity::parse(&severity).unwrap_or(Severity::Medium),
            active: row.get(7)?,
        })
    }
}

impl RuleStore for SqliteRuleStore {
    fn create_rule(&self, request: CreateRuleRequest) -> Result<ComplianceRule, StoreError> {
        let conn = db::lock(&self.conn)?;
        let rule = ComplianceRule {
            id: uuid::Uuid::new_v4().to_string(),
            version_id: uuid::Uuid::new_v4().to_string(),
            channel: request.channel,
            country: request.country,
            title: request.title,
            description: request.description,
            severity: request.severity,
            active: true,
        };

        conn.execute(
            &format!("INSERT INTO compliance_rules ({RULE_COLUMNS}, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                rule.id,
                rule.version_id,
                rule.channel,
                rule.country,
                rule.title,
                rule.description,
                rule.severity.as_str(),
                rule.active,
                db::ts(&Utc::now()),
            ],
        )?;

        Ok(rule)
    }

    fn active_rules(&self, channel: &str, country: &str) -> Result<Vec<ComplianceRule>, StoreError> {
        let conn = db::lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM compliance_rules
             WHERE active = 1 AND channel = ? AND (country IS NULL OR country = ?)
             ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![channel, country], Self::row_to_rule)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    fn deactivate(&self, id: &str) -> Result<(), StoreError> {
        let conn = db::lock(&self.conn)?;
        let updated = conn.execute(
            "UPDATE compliance_rules SET active = 0 WHERE id = ?",
            params![id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("rule {}", id)));
        }
        Ok(())
    }
}

/// SQLite-backed analysis result store.
///
/// `revision_id` is unique, so concurrent or retried inserts for the same
/// revision keep the first result.
pub struct SqliteAnalysisStore {
    conn: Mutex<Connection>,
}

impl SqliteAnalysisStore {
    /// Create a new SQLite analysis store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = db::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite analysis store (useful for testing).
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
            CREATE TABLE IF NOT EXISTS analysis_results (
                id TEXT PRIMARY KEY,
                revision_id TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                language TEXT,
                confidence REAL,
                violations TEXT NOT NULL,
                reason TEXT,
                created_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn row_to_analysis(row: &rusqlite::Row) -> rusqlite::Result<AnalysisResult> {
        let status: String = row.get(2)?;
        let confidence: Option<f64> = row.get(4)?;
        let violations_json: String = row.get(5)?;
        let created_at: String = row.get(7)?;
        let violations: Vec<Violation> = db::parse_json(&violations_json)?;

        Ok(AnalysisResult {
            id: row.get(0)?,
            revision_id: row.get(1)?,
            status: ComplianceStatus::parse(&status).unwrap_or(ComplianceStatus::Uncertain),
            language: row.get(3)?,
            confidence: confidence.map(|c| c as f32),
            violations,
            reason: row.get(6)?,
            created_at: db::parse_ts(&created_at)?,
        })
    }

    fn select(conn: &Connection, revision_id: &str) -> Result<Option<AnalysisResult>, StoreError> {
        let analysis = conn
            .query_row(
                &format!("SELECT {ANALYSIS_COLUMNS} FROM analysis_results WHERE revision_id = ?"),
                params![revision_id],
                Self::row_to_analysis,
            )
            .optional()?;
        Ok(analysis)
    }
}

impl AnalysisStore for SqliteAnalysisStore {
    fn insert_if_absent(&self, analysis: NewAnalysis) -> Result<AnalysisResult, StoreError> {
        let conn = db::lock(&self.conn)?;

        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO analysis_results ({ANALYSIS_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                uuid::Uuid::new_v4().to_string(),
                analysis.revision_id,
                analysis.status.as_str(),
                analysis.language,
                analysis.confidence.map(f64::from),
                serde_json::to_string(&analysis.violations)?,
                analysis.reason,
                db::ts(&Utc::now()),
            ],
        )?;

        Self::select(&conn, &analysis.revision_id)?.ok_or_else(|| {
            StoreError::NotFound(format!("analysis for revision {}", analysis.revision_id))
        })
    }

    fn get_for_revision(&self, revision_id: &str) -> Result<Option<AnalysisResult>, StoreError> {
        let conn = db::lock(&self.conn)?;
        Self::select(&conn, revision_id)
    }
}
