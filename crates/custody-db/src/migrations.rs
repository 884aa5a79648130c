//! Database migration runner.
//!
//! Embeds the SQL migration files at compile time and executes them on
//! database open. All statements use `IF NOT EXISTS` for idempotent re-running.

use crate::CustodyDb;
use crate::error::AuditError;

/// Chain schema: 5 tables, 7 indexes, 11 guard triggers.
const MIGRATION_001: &str = include_str!("../migrations/001_audit_chain.sql");

impl CustodyDb {
    /// Run all embedded migrations in sequence.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Migration` naming the failing migration.
    pub async fn run_migrations(&self) -> Result<(), AuditError> {
        let conn = self.gate().await?;
        conn.execute_batch(MIGRATION_001)
            .await
            .map_err(|e| AuditError::Migration(format!("001_audit_chain: {e}")))?;
        Ok(())
    }
}
