//! Named job locks shared across worker processes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode};
use thiserror::Error;

/// The fixed set of lockable scheduler jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobLock {
    IngestionScan,
    EscalationScan,
    RetentionPurge,
}

impl JobLock {
    pub const ALL: [JobLock; 3] = [
        JobLock::IngestionScan,
        JobLock::EscalationScan,
        JobLock::RetentionPurge,
    ];

    /// Lock name, also used as the job name in logs and metrics.
    pub fn key(self) -> &'static str {
        match self {
            JobLock::IngestionScan => "ingestion-scan",
            JobLock::EscalationScan => "escalation-scan",
            JobLock::RetentionPurge => "retention-purge",
        }
    }
}

impl std::fmt::Display for JobLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock directory {path}: {message}")]
    Directory { path: PathBuf, message: String },

    #[error("lock database error: {0}")]
    Database(String),

    #[error("lock state poisoned")]
    Poisoned,
}

/// A held lock. Dropping the guard releases it, on every exit path.
pub struct LockGuard {
    job: JobLock,
    _hold: Box<dyn Send>,
}

impl LockGuard {
    /// Wrap a value whose `Drop` releases the lock.
    pub fn new(job: JobLock, hold: impl Send + 'static) -> Self {
        Self {
            job,
            _hold: Box::new(hold),
        }
    }

    pub fn job(&self) -> JobLock {
        self.job
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("job", &self.job).finish()
    }
}

/// Non-blocking mutual exclusion for scheduler jobs.
pub trait LockProvider: Send + Sync {
    /// Try to take the lock without waiting.
    ///
    /// Returns `Ok(None)` when someone else holds it.
    fn try_acquire(&self, job: JobLock) -> Result<Option<LockGuard>, LockError>;
}

/// Locks backed by one SQLite file per job.
///
/// The lock is an open `BEGIN EXCLUSIVE` transaction with a zero busy
/// timeout: a second holder in this or any other process fails immediately,
/// and the operating system drops the file lock if the holder dies.
pub struct SqliteLockProvider {
    dir: PathBuf,
}

impl SqliteLockProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, LockError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| LockError::Directory {
            path: dir.clone(),
            message: e.to_string(),
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock_path(&self, job: JobLock) -> PathBuf {
        self.dir.join(format!("{}.lock", job.key()))
    }
}

/// Open transaction holding the exclusive file lock.
struct HeldTransaction {
    conn: Connection,
}

impl Drop for HeldTransaction {
    fn drop(&mut self) {
        let _ = self.conn.execute_batch("ROLLBACK");
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

impl LockProvider for SqliteLockProvider {
    fn try_acquire(&self, job: JobLock) -> Result<Option<LockGuard>, LockError> {
        let conn = Connection::open(self.lock_path(job))
            .map_err(|e| LockError::Database(e.to_string()))?;
        conn.busy_timeout(Duration::ZERO)
            .map_err(|e| LockError::Database(e.to_string()))?;

        match conn.execute_batch("BEGIN EXCLUSIVE") {
            Ok(()) => Ok(Some(LockGuard::new(job, HeldTransaction { conn }))),
            Err(e) if is_busy(&e) => Ok(None),
            Err(e) => Err(LockError::Database(e.to_string())),
        }
    }
}

/// Process-local locks for single-worker deployments and tests.
#[derive(Default, Clone)]
pub struct InMemoryLockProvider {
    held: Arc<Mutex<HashSet<JobLock>>>,
}

impl InMemoryLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, job: JobLock) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(&job))
            .unwrap_or(false)
    }
}

struct HeldEntry {
    held: Arc<Mutex<HashSet<JobLock>>>,
    job: JobLock,
}

impl Drop for HeldEntry {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.job);
    }
}

impl LockProvider for InMemoryLockProvider {
    fn try_acquire(&self, job: JobLock) -> Result<Option<LockGuard>, LockError> {
        let mut held = self.held.lock().map_err(|_| LockError::Poisoned)?;
        if !held.insert(job) {
            return Ok(None);
        }
        Ok(Some(LockGuard::new(
            job,
            HeldEntry {
                held: Arc::clone(&self.held),
                job,
            },
        )))
    }
}
