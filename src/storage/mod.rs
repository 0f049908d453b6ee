//! Durable state subsystem.
//!
//! # Data Flow
//! ```text
//! Database (one long-lived SQLite connection)
//!     → denylist.rs (set of banned source addresses)
//!     → rules.rs    (operator regex rules, creation order)
//!     → audit.rs    (append-only decision log + aggregates)
//! ```
//!
//! # Design Decisions
//! - The connection is opened once and shared; every statement runs under
//!   the connection lock, so writes to a table never interleave
//! - All SQL uses bound parameters; addresses and patterns are opaque text
//! - Async callers go through `blocking`, so statements run on tokio's
//!   blocking pool and never hold the connection lock on a worker thread
//! - Schema is created idempotently at open

pub mod audit;
pub mod denylist;
pub mod rules;

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use thiserror::Error;

pub use audit::{AuditLog, AuditStats, LogEntry, Outcome};
pub use denylist::DenylistStore;
pub use rules::{Rule, RuleError, RuleStore};

/// Error type for storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A thread panicked while holding the connection.
    #[error("database connection lock poisoned")]
    Poisoned,

    /// IO error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking task running the statement panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Shared handle to the gate's SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file and initialize the schema.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let db = Self::from_connection(conn)?;
        tracing::info!(path = %path.display(), "Database opened");
        Ok(db)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` with exclusive access to the connection.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> StorageResult<T> {
        let mut conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(f(&mut conn)?)
    }

    pub fn denylist(&self) -> DenylistStore {
        DenylistStore::new(self.clone())
    }

    pub fn rules(&self) -> RuleStore {
        RuleStore::new(self.clone())
    }

    pub fn audit(&self) -> AuditLog {
        AuditLog::new(self.clone())
    }
}

/// Run a store operation on the blocking thread pool.
pub async fn blocking<T, E, F>(f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: From<StorageError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(StorageError::from(e).into()),
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            ip TEXT NOT NULL,
            method TEXT NOT NULL,
            path TEXT NOT NULL,
            body TEXT NOT NULL,
            status TEXT NOT NULL,
            reason TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp);

        CREATE TABLE IF NOT EXISTS denylist (
            ip TEXT PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT ''
        );
        "#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("waf.db");

        {
            let db = Database::open(&path).unwrap();
            db.denylist().add("203.0.113.7").unwrap();
            db.rules().add("foo.*bar", "demo").unwrap();
            db.audit()
                .record("203.0.113.7", "GET", "/", "", Outcome::Blocked, "blacklisted")
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert!(db.denylist().contains("203.0.113.7").unwrap());
        assert_eq!(db.rules().list().unwrap()[0].pattern, "foo.*bar");
        assert_eq!(db.audit().recent(10).unwrap().len(), 1);
    }

    #[test]
    fn test_schema_init_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| init_schema(conn)).unwrap();
    }

    #[tokio::test]
    async fn test_blocking_runs_store_calls_off_the_runtime() {
        let db = Database::open_in_memory().unwrap();
        let denylist = db.denylist();

        let added = blocking(move || denylist.add("198.51.100.4")).await.unwrap();
        assert!(added);
        assert!(db.denylist().contains("198.51.100.4").unwrap());

        let audit = db.audit();
        let stats = blocking(move || audit.stats()).await.unwrap();
        assert!(stats.status.is_empty());
    }

    #[tokio::test]
    async fn test_blocking_reports_panicked_task() {
        let result = blocking(|| -> StorageResult<()> { panic!("statement panicked") }).await;
        assert!(matches!(result, Err(StorageError::Task(_))));
    }
}
