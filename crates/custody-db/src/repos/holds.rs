//! Legal hold repository.
//!
//! Holds are created and released here and nowhere else. The storage
//! triggers reject deletes and any update other than a single release.

use chrono::{DateTime, Utc};
use custody_core::entities::{LegalHold, NewHold};
use custody_core::enums::AuditScope;
use custody_core::ids::{PREFIX_HOLD, generate};
use libsql::Connection;
use tracing::info;

use crate::error::AuditError;
use crate::helpers::{
    format_datetime, get_opt_string, parse_datetime, parse_enum, parse_optional_datetime,
    storage_precision,
};
use crate::service::AuditService;

const HOLD_COLUMNS: &str = "hold_id, tenant_id, scope, applies_from, applies_to, \
     investigation_id, reason, created_by, created_at, released_at, released_by, release_reason";

/// Filter criteria for hold listings.
#[derive(Debug, Default, Clone)]
pub struct HoldFilter {
    /// Holds for this tenant, plus cross-tenant holds.
    pub tenant_id: Option<String>,
    pub scope: Option<AuditScope>,
    pub active_only: bool,
    pub limit: Option<u32>,
}

fn row_to_hold(row: &libsql::Row) -> Result<LegalHold, AuditError> {
    Ok(LegalHold {
        hold_id: row.get::<String>(0)?,
        tenant_id: get_opt_string(row, 1)?,
        scope: parse_enum(&row.get::<String>(2)?)?,
        applies_from: parse_optional_datetime(get_opt_string(row, 3)?.as_deref())?,
        applies_to: parse_optional_datetime(get_opt_string(row, 4)?.as_deref())?,
        investigation_id: row.get::<String>(5)?,
        reason: row.get::<String>(6)?,
        created_by: row.get::<String>(7)?,
        created_at: parse_datetime(&row.get::<String>(8)?)?,
        released_at: parse_optional_datetime(get_opt_string(row, 9)?.as_deref())?,
        released_by: get_opt_string(row, 10)?,
        release_reason: get_opt_string(row, 11)?,
    })
}

async fn fetch_hold(conn: &Connection, hold_id: &str) -> Result<Option<LegalHold>, AuditError> {
    let mut rows = conn
        .query(
            &format!("SELECT {HOLD_COLUMNS} FROM legal_holds WHERE hold_id = ?1"),
            [hold_id],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row_to_hold(&row)?)),
        None => Ok(None),
    }
}

fn not_found(hold_id: &str) -> AuditError {
    AuditError::NotFound {
        entity_type: "LegalHold".into(),
        id: hold_id.to_string(),
    }
}

/// Holds on `scope` still in force at `now`, for every tenant.
///
/// Runs inside the retention batch transaction so a hold committed before
/// the batch starts is always seen by it.
pub(crate) async fn active_holds_for_scope(
    conn: &Connection,
    scope: AuditScope,
    now: DateTime<Utc>,
) -> Result<Vec<LegalHold>, AuditError> {
    let mut rows = conn
        .query(
            &format!(
                "SELECT {HOLD_COLUMNS} FROM legal_holds
                 WHERE scope = ?1 AND (released_at IS NULL OR released_at > ?2)"
            ),
            libsql::params![scope.as_str(), format_datetime(&now)],
        )
        .await?;
    let mut holds = Vec::new();
    while let Some(row) = rows.next().await? {
        holds.push(row_to_hold(&row)?);
    }
    Ok(holds)
}

impl AuditService {
    /// Place a legal hold. It takes effect for the next retention batch.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::HoldValidation` for an inverted window or a blank
    /// required field.
    pub async fn create_hold(&self, new: NewHold) -> Result<LegalHold, AuditError> {
        new.validate()
            .map_err(|e| AuditError::HoldValidation(e.to_string()))?;

        let hold = LegalHold {
            hold_id: generate(PREFIX_HOLD),
            tenant_id: new.tenant_id,
            scope: new.scope,
            applies_from: new.applies_from.map(storage_precision),
            applies_to: new.applies_to.map(storage_precision),
            investigation_id: new.investigation_id,
            reason: new.reason,
            created_by: new.created_by,
            created_at: storage_precision(Utc::now()),
            released_at: None,
            released_by: None,
            release_reason: None,
        };

        let conn = self.db().gate().await?;
        conn.execute(
            &format!(
                "INSERT INTO legal_holds ({HOLD_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, NULL, NULL)"
            ),
            libsql::params![
                hold.hold_id.as_str(),
                hold.tenant_id.as_deref(),
                hold.scope.as_str(),
                hold.applies_from.as_ref().map(format_datetime),
                hold.applies_to.as_ref().map(format_datetime),
                hold.investigation_id.as_str(),
                hold.reason.as_str(),
                hold.created_by.as_str(),
                format_datetime(&hold.created_at)
            ],
        )
        .await?;

        info!(
            hold_id = %hold.hold_id,
            tenant = hold.tenant_id.as_deref().unwrap_or("*"),
            scope = %hold.scope,
            investigation = %hold.investigation_id,
            "legal hold placed"
        );
        Ok(hold)
    }

    /// Release a hold. Releasing an already released hold returns it
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::NotFound` for an unknown id and
    /// `AuditError::HoldValidation` for a blank `released_by` or `reason`.
    pub async fn release_hold(
        &self,
        hold_id: &str,
        released_by: &str,
        reason: &str,
    ) -> Result<LegalHold, AuditError> {
        if released_by.trim().is_empty() {
            return Err(AuditError::HoldValidation(
                "released_by must not be empty".into(),
            ));
        }
        if reason.trim().is_empty() {
            return Err(AuditError::HoldValidation(
                "release reason must not be empty".into(),
            ));
        }

        let conn = self.db().gate().await?;
        let existing = fetch_hold(&conn, hold_id)
            .await?
            .ok_or_else(|| not_found(hold_id))?;
        if existing.released_at.is_some() {
            return Ok(existing);
        }

        let released_at = storage_precision(Utc::now());
        let changed = conn
            .execute(
                "UPDATE legal_holds
                 SET released_at = ?2, released_by = ?3, release_reason = ?4
                 WHERE hold_id = ?1 AND released_at IS NULL",
                libsql::params![hold_id, format_datetime(&released_at), released_by, reason],
            )
            .await?;
        if changed == 0 {
            // Another connection released it first.
            return fetch_hold(&conn, hold_id)
                .await?
                .ok_or_else(|| not_found(hold_id));
        }

        info!(hold_id, released_by, "legal hold released");
        Ok(LegalHold {
            released_at: Some(released_at),
            released_by: Some(released_by.to_string()),
            release_reason: Some(reason.to_string()),
            ..existing
        })
    }

    /// Fetch a single hold.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::NotFound` if no hold has this id.
    pub async fn get_hold(&self, hold_id: &str) -> Result<LegalHold, AuditError> {
        let conn = self.db().gate().await?;
        fetch_hold(&conn, hold_id)
            .await?
            .ok_or_else(|| not_found(hold_id))
    }

    /// List holds, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the query fails.
    pub async fn list_holds(&self, filter: &HoldFilter) -> Result<Vec<LegalHold>, AuditError> {
        let mut conditions = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(ref tenant) = filter.tenant_id {
            params.push(libsql::Value::Text(tenant.clone()));
            conditions.push(format!(
                "(tenant_id = ?{} OR tenant_id IS NULL)",
                params.len()
            ));
        }
        if let Some(scope) = filter.scope {
            params.push(libsql::Value::Text(scope.as_str().to_string()));
            conditions.push(format!("scope = ?{}", params.len()));
        }
        if filter.active_only {
            conditions.push("released_at IS NULL".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let limit = filter.limit.unwrap_or(100);
        let sql = format!(
            "SELECT {HOLD_COLUMNS} FROM legal_holds {where_clause}
             ORDER BY created_at DESC, hold_id LIMIT {limit}"
        );

        let conn = self.db().gate().await?;
        let mut rows = conn.query(&sql, libsql::params_from_iter(params)).await?;
        let mut holds = Vec::new();
        while let Some(row) = rows.next().await? {
            holds.push(row_to_hold(&row)?);
        }
        Ok(holds)
    }
}
