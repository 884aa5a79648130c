//! Audit entry repository.
//!
//! Entries are inserted by the chain writer and deleted only through
//! [`delete_sanctioned`], which the storage triggers reject unless the
//! retention engine's sanction row is present in the same transaction.

use chrono::{DateTime, Utc};
use custody_core::entities::{AuditEntry, ChainScope, EntryStub, PurgeLink};
use custody_core::enums::AuditScope;
use libsql::Connection;

use crate::error::AuditError;
use crate::helpers::{
    format_datetime, get_opt_string, optional_json_text, parse_datetime, parse_enum,
    parse_optional_json,
};
use crate::retention::PurgeSanction;
use crate::service::AuditService;

pub(crate) const ENTRY_COLUMNS: &str = "entry_id, tenant_id, scope, action, action_kind, \
     sensitivity_level, actor_id, actor_role, auth_method, resource_type, resource_id, \
     context, before_state, after_state, created_at, prev_hash, hash";

/// Hash and timestamp of the newest entry on a chain.
#[derive(Debug, Clone)]
pub(crate) struct ChainTail {
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

pub(crate) fn row_to_entry(row: &libsql::Row) -> Result<AuditEntry, AuditError> {
    Ok(AuditEntry {
        entry_id: row.get::<String>(0)?,
        tenant_id: get_opt_string(row, 1)?,
        scope: parse_enum(&row.get::<String>(2)?)?,
        action: row.get::<String>(3)?,
        action_kind: parse_enum(&row.get::<String>(4)?)?,
        sensitivity_level: parse_enum(&row.get::<String>(5)?)?,
        actor_id: row.get::<String>(6)?,
        actor_role: row.get::<String>(7)?,
        auth_method: row.get::<String>(8)?,
        resource_type: row.get::<String>(9)?,
        resource_id: get_opt_string(row, 10)?,
        context: parse_optional_json(get_opt_string(row, 11)?.as_deref())?,
        before: parse_optional_json(get_opt_string(row, 12)?.as_deref())?,
        after: parse_optional_json(get_opt_string(row, 13)?.as_deref())?,
        created_at: parse_datetime(&row.get::<String>(14)?)?,
        prev_hash: row.get::<String>(15)?,
        hash: row.get::<String>(16)?,
    })
}

fn row_to_stub(row: &libsql::Row) -> Result<EntryStub, AuditError> {
    Ok(EntryStub {
        entry_id: row.get::<String>(0)?,
        tenant_id: get_opt_string(row, 1)?,
        scope: parse_enum(&row.get::<String>(2)?)?,
        created_at: parse_datetime(&row.get::<String>(3)?)?,
        prev_hash: row.get::<String>(4)?,
        hash: row.get::<String>(5)?,
    })
}

/// Newest entry of the chain, by `(created_at, entry_id)`.
pub(crate) async fn chain_tail(
    conn: &Connection,
    tenant_id: Option<&str>,
) -> Result<Option<ChainTail>, AuditError> {
    let mut rows = conn
        .query(
            "SELECT hash, created_at FROM audit_entries
             WHERE tenant_id IS ?1
             ORDER BY created_at DESC, entry_id DESC LIMIT 1",
            libsql::params![tenant_id],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(ChainTail {
            hash: row.get::<String>(0)?,
            created_at: parse_datetime(&row.get::<String>(1)?)?,
        })),
        None => Ok(None),
    }
}

pub(crate) async fn insert(conn: &Connection, entry: &AuditEntry) -> Result<(), AuditError> {
    let context = optional_json_text(entry.context.as_ref())?;
    let before = optional_json_text(entry.before.as_ref())?;
    let after = optional_json_text(entry.after.as_ref())?;
    conn.execute(
        &format!(
            "INSERT INTO audit_entries ({ENTRY_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
        ),
        libsql::params![
            entry.entry_id.as_str(),
            entry.tenant_id.as_deref(),
            entry.scope.as_str(),
            entry.action.as_str(),
            entry.action_kind.as_str(),
            entry.sensitivity_level.as_str(),
            entry.actor_id.as_str(),
            entry.actor_role.as_str(),
            entry.auth_method.as_str(),
            entry.resource_type.as_str(),
            entry.resource_id.as_deref(),
            context.as_deref(),
            before.as_deref(),
            after.as_deref(),
            format_datetime(&entry.created_at),
            entry.prev_hash.as_str(),
            entry.hash.as_str()
        ],
    )
    .await?;
    Ok(())
}

/// One page of entries in `scope` created at or before `cutoff`, strictly
/// after the keyset cursor `(created_at, entry_id)`.
pub(crate) async fn retention_candidates(
    conn: &Connection,
    scope: AuditScope,
    cutoff: DateTime<Utc>,
    after: Option<&(String, String)>,
    limit: u32,
) -> Result<Vec<EntryStub>, AuditError> {
    let (cursor_at, cursor_id) = after.map_or(("", ""), |(at, id)| (at.as_str(), id.as_str()));
    let mut rows = conn
        .query(
            "SELECT entry_id, tenant_id, scope, created_at, prev_hash, hash
             FROM audit_entries
             WHERE scope = ?1 AND created_at <= ?2
               AND (created_at > ?3 OR (created_at = ?3 AND entry_id > ?4))
             ORDER BY created_at, entry_id
             LIMIT ?5",
            libsql::params![
                scope.as_str(),
                format_datetime(&cutoff),
                cursor_at,
                cursor_id,
                limit
            ],
        )
        .await?;
    let mut stubs = Vec::new();
    while let Some(row) = rows.next().await? {
        stubs.push(row_to_stub(&row)?);
    }
    Ok(stubs)
}

/// Record purge links for `victims`, then delete them.
///
/// Requires a live sanction in the same transaction; without it the guard
/// triggers abort both statements.
pub(crate) async fn delete_sanctioned(
    conn: &Connection,
    sanction: &PurgeSanction,
    victims: &[EntryStub],
) -> Result<u64, AuditError> {
    let mut deleted = 0;
    for victim in victims {
        conn.execute(
            "INSERT INTO purge_links (hash, tenant_id, prev_hash, created_at, purge_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            libsql::params![
                victim.hash.as_str(),
                victim.tenant_id.as_deref(),
                victim.prev_hash.as_str(),
                format_datetime(&victim.created_at),
                sanction.purge_id()
            ],
        )
        .await?;
        deleted += conn
            .execute(
                "DELETE FROM audit_entries WHERE entry_id = ?1",
                [victim.entry_id.as_str()],
            )
            .await?;
    }
    Ok(deleted)
}

/// Purge links of one chain, keyed by the purged entry's hash.
pub(crate) async fn purge_links_for_chain(
    conn: &Connection,
    tenant_id: Option<&str>,
) -> Result<Vec<PurgeLink>, AuditError> {
    let mut rows = conn
        .query(
            "SELECT hash, tenant_id, prev_hash, created_at, purge_id
             FROM purge_links WHERE tenant_id IS ?1",
            libsql::params![tenant_id],
        )
        .await?;
    let mut links = Vec::new();
    while let Some(row) = rows.next().await? {
        links.push(PurgeLink {
            hash: row.get::<String>(0)?,
            tenant_id: get_opt_string(&row, 1)?,
            prev_hash: row.get::<String>(2)?,
            created_at: parse_datetime(&row.get::<String>(3)?)?,
            purge_id: row.get::<String>(4)?,
        });
    }
    Ok(links)
}

impl AuditService {
    /// Fetch a single entry.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::NotFound` if no entry has this id.
    pub async fn get_entry(&self, entry_id: &str) -> Result<AuditEntry, AuditError> {
        let conn = self.db().gate().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM audit_entries WHERE entry_id = ?1"),
                [entry_id],
            )
            .await?;
        let row = rows.next().await?.ok_or_else(|| AuditError::NotFound {
            entity_type: "AuditEntry".into(),
            id: entry_id.to_string(),
        })?;
        row_to_entry(&row)
    }

    /// Every remaining entry of one chain, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the query fails.
    pub async fn chain_entries(
        &self,
        tenant_id: Option<&str>,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let conn = self.db().gate().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM audit_entries
                     WHERE tenant_id IS ?1
                     ORDER BY created_at, entry_id"
                ),
                libsql::params![tenant_id],
            )
            .await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(row_to_entry(&row)?);
        }
        Ok(entries)
    }

    /// Entries touching one resource across all chains, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the query fails.
    pub async fn entries_for_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
        limit: u32,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let conn = self.db().gate().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM audit_entries
                     WHERE resource_type = ?1 AND resource_id = ?2
                     ORDER BY created_at DESC, entry_id DESC
                     LIMIT ?3"
                ),
                libsql::params![resource_type, resource_id, limit],
            )
            .await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(row_to_entry(&row)?);
        }
        Ok(entries)
    }

    /// Every chain that currently has entries, global chain first.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the query fails.
    pub async fn list_chains(&self) -> Result<Vec<ChainScope>, AuditError> {
        let conn = self.db().gate().await?;
        let mut rows = conn
            .query(
                "SELECT DISTINCT tenant_id FROM audit_entries ORDER BY tenant_id",
                (),
            )
            .await?;
        let mut chains = Vec::new();
        while let Some(row) = rows.next().await? {
            chains.push(ChainScope::from_tenant(get_opt_string(&row, 0)?.as_deref()));
        }
        Ok(chains)
    }
}

#[cfg(test)]
mod tests {
    use custody_core::entities::{ActionSpec, Actor, NewEntry};
    use custody_core::enums::ActionKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::test_support::helpers::{admin_action, test_service};

    use super::*;

    #[tokio::test]
    async fn get_entry_roundtrips_every_field() {
        let svc = test_service().await;
        let written = svc
            .record_action(
                admin_action("t-1")
                    .resource_id("inv-1")
                    .context(&json!({"ip": "10.0.0.1"}))
                    .before(&json!({"total": 10}))
                    .after(&json!({"total": 0})),
            )
            .await
            .unwrap();

        let read = svc.get_entry(&written.entry_id).await.unwrap();
        assert_eq!(read, written);
    }

    #[tokio::test]
    async fn get_entry_unknown_is_not_found() {
        let svc = test_service().await;
        let err = svc.get_entry("aud-missing").await.unwrap_err();
        assert!(matches!(err, AuditError::NotFound { .. }));
    }

    #[tokio::test]
    async fn entries_for_resource_spans_tenants() {
        let svc = test_service().await;
        for tenant in ["t-1", "t-2"] {
            svc.record_action(admin_action(tenant).resource_id("inv-7"))
                .await
                .unwrap();
        }
        svc.record_action(admin_action("t-1").resource_id("inv-8"))
            .await
            .unwrap();

        let hits = svc.entries_for_resource("invoice", "inv-7", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].created_at >= hits[1].created_at);
    }

    #[tokio::test]
    async fn list_chains_includes_global() {
        let svc = test_service().await;
        svc.record_action(admin_action("t-2")).await.unwrap();
        svc.record_action(NewEntry::global(
            Actor::system(),
            ActionSpec::new("scheduler.tick", AuditScope::System, ActionKind::Execute),
            "scheduler",
        ))
        .await
        .unwrap();

        assert_eq!(
            svc.list_chains().await.unwrap(),
            vec![ChainScope::Global, ChainScope::Tenant("t-2".into())]
        );
    }
}
