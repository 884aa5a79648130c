//! Purge run repository.
//!
//! A run row is inserted when the retention engine starts and finalized
//! once. After `completed_at` is set the storage triggers freeze it.

use custody_core::entities::{PurgeRun, PurgeSummary};
use libsql::Connection;

use crate::error::AuditError;
use crate::helpers::{
    format_datetime, get_opt_string, parse_datetime, parse_enum, parse_optional_datetime,
};
use crate::service::AuditService;

const RUN_COLUMNS: &str = "purge_id, actor_type, actor_id, dry_run, policy_snapshot, \
     purge_summary, status, error, started_at, completed_at";

fn row_to_run(row: &libsql::Row) -> Result<PurgeRun, AuditError> {
    let snapshot = row.get::<String>(4)?;
    let summary = row.get::<String>(5)?;
    Ok(PurgeRun {
        purge_id: row.get::<String>(0)?,
        actor_type: parse_enum(&row.get::<String>(1)?)?,
        actor_id: row.get::<String>(2)?,
        dry_run: row.get::<i64>(3)? != 0,
        policy_snapshot: serde_json::from_str(&snapshot)
            .map_err(|e| AuditError::Query(format!("Invalid policy snapshot: {e}")))?,
        summary: serde_json::from_str::<PurgeSummary>(&summary)
            .map_err(|e| AuditError::Query(format!("Invalid purge summary: {e}")))?,
        status: parse_enum(&row.get::<String>(6)?)?,
        error: get_opt_string(row, 7)?,
        started_at: parse_datetime(&row.get::<String>(8)?)?,
        completed_at: parse_optional_datetime(get_opt_string(row, 9)?.as_deref())?,
    })
}

fn summary_text(summary: &PurgeSummary) -> Result<String, AuditError> {
    serde_json::to_string(summary).map_err(|e| AuditError::Encoding(e.to_string()))
}

pub(crate) async fn insert(conn: &Connection, run: &PurgeRun) -> Result<(), AuditError> {
    let snapshot = serde_json::to_string(&run.policy_snapshot)
        .map_err(|e| AuditError::Encoding(e.to_string()))?;
    conn.execute(
        &format!(
            "INSERT INTO purge_runs ({RUN_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        ),
        libsql::params![
            run.purge_id.as_str(),
            run.actor_type.as_str(),
            run.actor_id.as_str(),
            i64::from(run.dry_run),
            snapshot,
            summary_text(&run.summary)?,
            run.status.as_str(),
            run.error.as_deref(),
            format_datetime(&run.started_at),
            run.completed_at.as_ref().map(format_datetime)
        ],
    )
    .await?;
    Ok(())
}

/// Write the final summary, status, error, and completion time.
pub(crate) async fn finalize(conn: &Connection, run: &PurgeRun) -> Result<(), AuditError> {
    let changed = conn
        .execute(
            "UPDATE purge_runs
             SET purge_summary = ?2, status = ?3, error = ?4, completed_at = ?5
             WHERE purge_id = ?1",
            libsql::params![
                run.purge_id.as_str(),
                summary_text(&run.summary)?,
                run.status.as_str(),
                run.error.as_deref(),
                run.completed_at.as_ref().map(format_datetime)
            ],
        )
        .await?;
    if changed == 0 {
        return Err(AuditError::NotFound {
            entity_type: "PurgeRun".into(),
            id: run.purge_id.clone(),
        });
    }
    Ok(())
}

impl AuditService {
    /// Fetch a single purge run.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::NotFound` if no run has this id.
    pub async fn get_purge_run(&self, purge_id: &str) -> Result<PurgeRun, AuditError> {
        let conn = self.db().gate().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {RUN_COLUMNS} FROM purge_runs WHERE purge_id = ?1"),
                [purge_id],
            )
            .await?;
        let row = rows.next().await?.ok_or_else(|| AuditError::NotFound {
            entity_type: "PurgeRun".into(),
            id: purge_id.to_string(),
        })?;
        row_to_run(&row)
    }

    /// Most recent purge runs, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the query fails.
    pub async fn list_purge_runs(&self, limit: u32) -> Result<Vec<PurgeRun>, AuditError> {
        let conn = self.db().gate().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM purge_runs
                     ORDER BY started_at DESC, purge_id DESC LIMIT ?1"
                ),
                libsql::params![limit],
            )
            .await?;
        let mut runs = Vec::new();
        while let Some(row) = rows.next().await? {
            runs.push(row_to_run(&row)?);
        }
        Ok(runs)
    }
}
