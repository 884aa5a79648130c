//! Chain writer: the only path that inserts audit entries.

use chrono::{Duration, Utc};
use custody_core::entities::{
    ActionSpec, Actor, AuditEntry, ChainScope, NewEntry, SENTINEL_HASH,
};
use custody_core::ids::{PREFIX_ENTRY, generate};
use tracing::{debug, error, warn};

use crate::chain::codec;
use crate::error::AuditError;
use crate::helpers::storage_precision;
use crate::repos::entries;
use crate::service::AuditService;

fn require(field: &str, value: &str) -> Result<(), AuditError> {
    if value.trim().is_empty() {
        return Err(AuditError::InvalidArgument(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

fn validate(new: &NewEntry) -> Result<(), AuditError> {
    if let Some(tenant) = new.tenant_id.as_deref() {
        require("tenant_id", tenant)?;
    }
    require("actor.id", &new.actor.id)?;
    require("actor.role", &new.actor.role)?;
    require("actor.auth_method", &new.actor.auth_method)?;
    require("action", &new.action.key)?;
    require("resource_type", &new.resource_type)
}

impl AuditService {
    /// Append one entry to its chain and return it with its final hash.
    ///
    /// Payloads are checked before the chain lease is taken, so a bad
    /// payload never holds up other writers.
    ///
    /// # Errors
    ///
    /// - `AuditError::Encoding` for an unencodable or oversized payload
    /// - `AuditError::InvalidArgument` for a blank identifying field
    /// - `AuditError::Contention` if the chain lease is not acquired in time
    /// - `AuditError::IntegrityViolation` if the store's guard rejects the insert
    pub async fn record_action(&self, new: NewEntry) -> Result<AuditEntry, AuditError> {
        if let Some(problem) = new.payload_errors().first() {
            return Err(AuditError::Encoding(problem.clone()));
        }
        validate(&new)?;
        codec::check_payloads(
            &[new.context.as_ref(), new.before.as_ref(), new.after.as_ref()],
            self.config().store.max_payload_bytes,
        )?;

        let chain = ChainScope::from_tenant(new.tenant_id.as_deref());
        let _lease = self
            .leases()
            .acquire(chain.clone(), self.config().store.lock_wait())
            .await?;

        let conn = self.db().gate().await?;
        let tx = conn.transaction().await?;
        let result = append_in_tx(&tx, &chain, new).await;
        let appended = match result {
            Ok(entry) => tx.commit().await.map(|()| entry).map_err(AuditError::from),
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(chain = %chain, error = %rollback, "rollback of failed append failed");
                }
                Err(e)
            }
        };

        match appended {
            Ok(entry) => {
                debug!(
                    chain = %chain,
                    entry_id = %entry.entry_id,
                    action = %entry.action,
                    hash = %entry.hash,
                    "audit entry appended"
                );
                Ok(entry)
            }
            Err(e) => {
                if matches!(e, AuditError::IntegrityViolation(_)) {
                    error!(chain = %chain, error = %e, "append rejected by store guard");
                }
                Err(e)
            }
        }
    }

    /// Append an entry attributed to the platform itself.
    ///
    /// # Errors
    ///
    /// Same as [`Self::record_action`].
    pub async fn record_system_action(
        &self,
        tenant_id: Option<&str>,
        action: ActionSpec,
        resource_type: &str,
        resource_id: Option<&str>,
        context: Option<serde_json::Value>,
    ) -> Result<AuditEntry, AuditError> {
        let mut new = NewEntry::on_chain(
            tenant_id.map(String::from),
            Actor::system(),
            action,
            resource_type,
        );
        new.resource_id = resource_id.map(String::from);
        new.context = context;
        self.record_action(new).await
    }
}

/// Read the tail, stamp and hash the entry, insert it. Caller owns the
/// transaction and the chain lease.
async fn append_in_tx(
    conn: &libsql::Connection,
    chain: &ChainScope,
    new: NewEntry,
) -> Result<AuditEntry, AuditError> {
    let tail = entries::chain_tail(conn, chain.tenant_id()).await?;
    let now = storage_precision(Utc::now());
    let (prev_hash, created_at) = match tail {
        Some(tail) => {
            let floor = tail.created_at + Duration::microseconds(1);
            (tail.hash, now.max(floor))
        }
        None => (SENTINEL_HASH.to_string(), now),
    };

    let mut entry = AuditEntry {
        entry_id: generate(PREFIX_ENTRY),
        tenant_id: new.tenant_id,
        scope: new.action.scope,
        action: new.action.key,
        action_kind: new.action.kind,
        sensitivity_level: new.action.sensitivity,
        actor_id: new.actor.id,
        actor_role: new.actor.role,
        auth_method: new.actor.auth_method,
        resource_type: new.resource_type,
        resource_id: new.resource_id,
        context: new.context,
        before: new.before,
        after: new.after,
        created_at,
        prev_hash,
        hash: String::new(),
    };
    entry.hash = codec::entry_hash(&entry)?;
    entries::insert(conn, &entry).await?;
    Ok(entry)
}
