//! # custody-db
//!
//! libSQL storage for the custody audit trail: the hash-chained entry log,
//! legal holds, purge runs, and the retention engine that prunes the log.
//!
//! Uses the `libsql` crate (C `SQLite` fork, v0.9.29). Immutability is
//! enforced by triggers installed with the schema, so even direct SQL against
//! the database file cannot rewrite an entry.
//!
//! The public surface is [`service::AuditService`]; [`CustodyDb`] is the raw
//! handle it wraps.

pub mod chain;
pub mod error;
pub mod helpers;
mod migrations;
pub mod repos;
pub mod retention;
pub mod service;

#[cfg(test)]
mod test_support;

use std::time::Duration;

use custody_config::StoreConfig;
use error::AuditError;
use libsql::Builder;
use tokio::sync::{Mutex, MutexGuard};
use tracing::error;

/// How many write transactions the store admits at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageConcurrency {
    /// One writer at a time across all tenants. Tenant leases never contend
    /// with each other, but their transactions queue on the store gate.
    SingleWriter,
}

/// Central database handle for the custody store.
///
/// Wraps a libSQL database and its single connection. The connection sits
/// behind an async gate: a transaction holds the gate from `BEGIN` to
/// `COMMIT`, so statements from concurrent tasks never interleave inside it.
pub struct CustodyDb {
    /// Owner of the file or memory store `conn` was opened from; it must
    /// outlive the connection.
    _db: libsql::Database,
    conn: Mutex<libsql::Connection>,
    gate_wait: Duration,
}

impl CustodyDb {
    /// Open a local-only database at the given path with default store
    /// settings.
    ///
    /// Runs migrations automatically on first open.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str) -> Result<Self, AuditError> {
        let store = StoreConfig {
            path: path.to_string(),
            ..StoreConfig::default()
        };
        Self::open(&store).await
    }

    /// Open the database described by `store`.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open(store: &StoreConfig) -> Result<Self, AuditError> {
        let db = Builder::new_local(&store.path).build().await?;
        let conn = db.connect()?;

        // Enable foreign keys (must be per-connection in SQLite)
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| AuditError::Migration(format!("PRAGMA foreign_keys: {e}")))?;

        if !store.is_in_memory() {
            // Both pragmas return a row, so they go through `query`.
            let busy = format!("PRAGMA busy_timeout = {}", store.lock_wait_ms);
            conn.query(&busy, ())
                .await
                .map_err(|e| AuditError::Migration(format!("PRAGMA busy_timeout: {e}")))?;
            conn.query("PRAGMA journal_mode = WAL", ())
                .await
                .map_err(|e| AuditError::Migration(format!("PRAGMA journal_mode: {e}")))?;
        }

        let custody_db = Self {
            _db: db,
            conn: Mutex::new(conn),
            gate_wait: store.lock_wait(),
        };
        custody_db.run_migrations().await?;

        let outstanding = {
            let conn = custody_db.gate().await?;
            retention::outstanding_sanctions(&conn).await?
        };
        if outstanding > 0 {
            error!(
                path = %store.path,
                outstanding,
                "purge sanction rows found outside a retention run"
            );
        }
        Ok(custody_db)
    }

    /// Acquire exclusive use of the connection, waiting at most the
    /// configured lock wait.
    ///
    /// Hold the returned guard for the whole of a transaction.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Contention` if the gate stays busy past the wait.
    pub async fn gate(&self) -> Result<MutexGuard<'_, libsql::Connection>, AuditError> {
        tokio::time::timeout(self.gate_wait, self.conn.lock())
            .await
            .map_err(|_| AuditError::Contention {
                resource: "store".into(),
                waited_ms: u64::try_from(self.gate_wait.as_millis()).unwrap_or(u64::MAX),
            })
    }

    /// Write concurrency the underlying store supports.
    #[must_use]
    pub const fn concurrency(&self) -> StorageConcurrency {
        StorageConcurrency::SingleWriter
    }
}
