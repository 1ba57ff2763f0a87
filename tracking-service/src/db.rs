//! Database module for SQLite operations.
//!
//! This module provides the `Database` struct and all database operations
//! organized into submodules by domain.

mod entities;
mod migrations;
pub mod models;
mod tracking;

pub use models::{
    AppliedUpdate, CarrierPosition, EntityState, NewTrackingRecord, PositionWrite,
    TrackingUpdateRecord,
};

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{DatabaseError, ServiceError, ServiceResult};

/// Database manager for SQLite operations
pub struct Database {
    conn: Mutex<Connection>,
    /// Latest history timestamp handed out; only touched while `conn` is held
    history_clock: Mutex<DateTime<Utc>>,
}

impl Database {
    /// Open or create the database at the given path
    pub fn open(path: &Path) -> ServiceResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ServiceError::Database(DatabaseError::Connection(
                    rusqlite::Error::ToSqlConversionFailure(Box::new(e)),
                ))
            })?;
        }

        let conn = Connection::open(path).map_err(DatabaseError::Connection)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(DatabaseError::Query)?;

        Self::from_connection(conn)
    }

    /// Private in-memory database, used by tests and tooling
    pub fn open_in_memory() -> ServiceResult<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::Connection)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(DatabaseError::Query)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> ServiceResult<Self> {
        // Run all migrations
        migrations::run_migrations(&conn)?;

        let last_history_at = conn
            .query_row("SELECT MAX(created_at) FROM load_updates", [], |row| {
                row.get::<_, Option<String>>(0)
            })
            .map_err(DatabaseError::Query)?
            .map(|s| models::parse_timestamp(0, &s))
            .transpose()
            .map_err(DatabaseError::Query)?
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        Ok(Self {
            conn: Mutex::new(conn),
            history_clock: Mutex::new(last_history_at),
        })
    }

    fn conn(&self) -> ServiceResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ServiceError::Database(DatabaseError::Poisoned))
    }

    /// Run raw SQL against the connection, for tests that break the schema
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> ServiceResult<()> {
        self.conn()?
            .execute_batch(sql)
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    /// Next history timestamp: wall clock, but never earlier than the last one.
    /// Truncated to the stored precision so values read back compare equal.
    fn next_history_timestamp(&self) -> ServiceResult<DateTime<Utc>> {
        let mut last = self
            .history_clock
            .lock()
            .map_err(|_| ServiceError::Database(DatabaseError::Poisoned))?;
        let now = Utc::now().trunc_subsecs(6).max(*last);
        *last = now;
        Ok(now)
    }
}

/// Run a database call on the blocking pool
pub async fn run_blocking<T, F>(db: &Arc<Database>, f: F) -> ServiceResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> ServiceResult<T> + Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| ServiceError::Internal {
            message: format!("Database task failed: {}", e),
        })?
}
