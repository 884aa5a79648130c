//! Retention and purge engine.
//!
//! For every scope with a configured window, entries older than the cutoff
//! are scanned in keyset-paginated batches. Each batch is one transaction:
//! select candidates, load the holds in force, delete what no hold covers.
//! A batch that fails rolls back alone; batches committed before it stand
//! and the run is finalized as `partial`.
//!
//! Deletes go through a [`PurgeSanction`], the only way past the storage
//! guard. Only this module can mint one.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use custody_core::entities::{EntryStub, PurgeRun, PurgeSummary, ScopeSummary, is_covered};
use custody_core::enums::{ActorType, AuditScope, PurgeStatus, ScopeStatus};
use custody_core::ids::{PREFIX_PURGE, PREFIX_SANCTION, generate};
use libsql::Connection;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::error::AuditError;
use crate::helpers::{format_datetime, storage_precision};
use crate::repos::{entries, holds, purge_runs};
use crate::service::AuditService;

/// Permission to delete audit entries inside one transaction.
///
/// Minting inserts a row into `purge_sanctions`; the delete guard trigger
/// checks for it. The row is removed again before the transaction commits.
pub struct PurgeSanction {
    token: String,
    purge_id: String,
}

/// Sanction rows currently visible on `conn`. Outside a purge batch this
/// must be zero.
pub(crate) async fn outstanding_sanctions(conn: &Connection) -> Result<u64, AuditError> {
    let mut rows = conn
        .query("SELECT count(*) FROM purge_sanctions", ())
        .await?;
    let row = rows
        .next()
        .await?
        .ok_or_else(|| AuditError::Query("count(*) returned no row".into()))?;
    Ok(u64::try_from(row.get::<i64>(0)?).unwrap_or(0))
}

impl PurgeSanction {
    async fn grant(conn: &Connection, purge_id: &str) -> Result<Self, AuditError> {
        let outstanding = outstanding_sanctions(conn).await?;
        if outstanding > 0 {
            return Err(AuditError::IntegrityViolation(format!(
                "{outstanding} purge sanction(s) already outstanding; refusing to mint another"
            )));
        }
        let sanction = Self {
            token: generate(PREFIX_SANCTION),
            purge_id: purge_id.to_string(),
        };
        conn.execute(
            "INSERT INTO purge_sanctions (token, purge_id, granted_at) VALUES (?1, ?2, ?3)",
            libsql::params![
                sanction.token.as_str(),
                sanction.purge_id.as_str(),
                format_datetime(&Utc::now())
            ],
        )
        .await?;
        Ok(sanction)
    }

    async fn revoke(self, conn: &Connection) -> Result<(), AuditError> {
        conn.execute(
            "DELETE FROM purge_sanctions WHERE token = ?1",
            [self.token.as_str()],
        )
        .await?;
        Ok(())
    }

    pub(crate) fn purge_id(&self) -> &str {
        &self.purge_id
    }
}

/// Parameters of one retention run.
#[derive(Debug, Clone)]
pub struct RetentionRequest {
    pub dry_run: bool,
    pub batch_size: u32,
    pub actor_type: ActorType,
    pub actor_id: String,
    /// Clock for cutoffs and hold activity; `None` means now.
    pub as_of: Option<DateTime<Utc>>,
}

impl RetentionRequest {
    /// A run started by the scheduler.
    #[must_use]
    pub fn system(actor_id: impl Into<String>, batch_size: u32) -> Self {
        Self {
            dry_run: false,
            batch_size,
            actor_type: ActorType::System,
            actor_id: actor_id.into(),
            as_of: None,
        }
    }

    /// A run started by an operator.
    #[must_use]
    pub fn user(actor_id: impl Into<String>, batch_size: u32) -> Self {
        Self {
            actor_type: ActorType::User,
            ..Self::system(actor_id, batch_size)
        }
    }

    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub const fn as_of(mut self, now: DateTime<Utc>) -> Self {
        self.as_of = Some(now);
        self
    }
}

#[derive(Debug, Default)]
struct BatchOutcome {
    selected: u64,
    held: u64,
    purged: u64,
    skipped: u64,
    /// Keyset cursor: `(created_at, entry_id)` of the last selected row.
    last: Option<(String, String)>,
}

fn count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

async fn purge_batch(
    conn: &Connection,
    purge_id: &str,
    summary: &ScopeSummary,
    now: DateTime<Utc>,
    cursor: Option<&(String, String)>,
    request: &RetentionRequest,
) -> Result<BatchOutcome, AuditError> {
    let Some(cutoff) = summary.cutoff else {
        return Ok(BatchOutcome::default());
    };
    let candidates =
        entries::retention_candidates(conn, summary.scope, cutoff, cursor, request.batch_size)
            .await?;
    let Some(last) = candidates.last() else {
        return Ok(BatchOutcome::default());
    };
    let last = Some((format_datetime(&last.created_at), last.entry_id.clone()));
    let selected = count(candidates.len());

    let holds = holds::active_holds_for_scope(conn, summary.scope, now).await?;
    let (held, free): (Vec<EntryStub>, Vec<EntryStub>) = candidates
        .into_iter()
        .partition(|entry| is_covered(&holds, entry, now));

    let mut outcome = BatchOutcome {
        selected,
        held: count(held.len()),
        last,
        ..BatchOutcome::default()
    };
    if request.dry_run {
        outcome.skipped = count(free.len());
    } else if !free.is_empty() {
        let sanction = PurgeSanction::grant(conn, purge_id).await?;
        outcome.purged = entries::delete_sanctioned(conn, &sanction, &free).await?;
        sanction.revoke(conn).await?;
    }
    Ok(outcome)
}

fn policy_snapshot(
    windows: &BTreeMap<AuditScope, u32>,
    request: &RetentionRequest,
    now: DateTime<Utc>,
) -> serde_json::Value {
    let windows: BTreeMap<&str, u32> = windows.iter().map(|(s, d)| (s.as_str(), *d)).collect();
    json!({
        "windows": windows,
        "batch_size": request.batch_size,
        "as_of": format_datetime(&now),
    })
}

impl AuditService {
    /// Run retention as the configured scheduler actor, with the current
    /// time as the clock.
    ///
    /// # Errors
    ///
    /// See [`Self::run_retention_with`].
    pub async fn run_retention(
        &self,
        dry_run: bool,
        batch_size: u32,
    ) -> Result<PurgeRun, AuditError> {
        let request = RetentionRequest::system(&self.config().retention.actor_id, batch_size)
            .dry_run(dry_run);
        self.run_retention_with(request).await
    }

    /// Run retention as the scheduler actor against a caller-supplied clock.
    ///
    /// # Errors
    ///
    /// See [`Self::run_retention_with`].
    pub async fn run_retention_as_of(
        &self,
        now: DateTime<Utc>,
        dry_run: bool,
        batch_size: u32,
    ) -> Result<PurgeRun, AuditError> {
        let request = RetentionRequest::system(&self.config().retention.actor_id, batch_size)
            .dry_run(dry_run)
            .as_of(now);
        self.run_retention_with(request).await
    }

    /// Run retention over every scope and record the run.
    ///
    /// # Errors
    ///
    /// - `AuditError::InvalidArgument` for a zero batch size or an invalid
    ///   retention window
    /// - `AuditError::RetentionPartialFailure` if a batch fails; the error
    ///   carries the persisted partial run
    pub async fn run_retention_with(
        &self,
        request: RetentionRequest,
    ) -> Result<PurgeRun, AuditError> {
        if request.batch_size == 0 {
            return Err(AuditError::InvalidArgument(
                "batch_size must be > 0".into(),
            ));
        }
        let windows = self
            .config()
            .retention
            .scope_windows()
            .map_err(|e| AuditError::InvalidArgument(e.to_string()))?;
        let now = storage_precision(request.as_of.unwrap_or_else(Utc::now));
        let cutoffs = windows
            .iter()
            .map(|(&scope, &days)| {
                now.checked_sub_signed(Duration::days(i64::from(days)))
                    .map(|cutoff| (scope, (days, cutoff)))
                    .ok_or_else(|| {
                        AuditError::InvalidArgument(format!(
                            "retention window of {days} days for {scope} reaches before the earliest representable time"
                        ))
                    })
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let mut run = PurgeRun {
            purge_id: generate(PREFIX_PURGE),
            actor_type: request.actor_type,
            actor_id: request.actor_id.clone(),
            dry_run: request.dry_run,
            policy_snapshot: policy_snapshot(&windows, &request, now),
            summary: PurgeSummary::default(),
            status: PurgeStatus::Running,
            error: None,
            started_at: storage_precision(Utc::now()),
            completed_at: None,
        };
        {
            let conn = self.db().gate().await?;
            purge_runs::insert(&conn, &run).await?;
        }
        info!(
            purge_id = %run.purge_id,
            dry_run = run.dry_run,
            batch_size = request.batch_size,
            scopes = windows.len(),
            "retention run started"
        );

        for scope in AuditScope::ALL {
            let Some(&(days, cutoff)) = cutoffs.get(&scope) else {
                run.summary.scopes.push(ScopeSummary::disabled(scope));
                continue;
            };
            let mut summary = ScopeSummary::enabled(scope, days, cutoff);
            let outcome = self
                .purge_scope(&run.purge_id, &mut summary, now, &request)
                .await;
            if let Err(e) = outcome {
                summary.status = ScopeStatus::Failed;
                run.summary.scopes.push(summary);
                return Err(self.abandon(run, e).await);
            }
            run.summary.scopes.push(summary);
        }

        run.status = PurgeStatus::Completed;
        run.completed_at = Some(storage_precision(Utc::now()));
        {
            let conn = self.db().gate().await?;
            purge_runs::finalize(&conn, &run).await?;
        }
        info!(
            purge_id = %run.purge_id,
            purged = run.summary.total_purged(),
            held = run.summary.total_held(),
            skipped = run.summary.total_skipped(),
            "retention run completed"
        );
        Ok(run)
    }

    async fn purge_scope(
        &self,
        purge_id: &str,
        summary: &mut ScopeSummary,
        now: DateTime<Utc>,
        request: &RetentionRequest,
    ) -> Result<(), AuditError> {
        let mut cursor: Option<(String, String)> = None;
        loop {
            let conn = self.db().gate().await?;
            let tx = conn.transaction().await?;
            let result = purge_batch(&tx, purge_id, summary, now, cursor.as_ref(), request).await;
            let batch = match result {
                Ok(batch) => {
                    tx.commit().await?;
                    batch
                }
                Err(e) => {
                    if let Err(rollback) = tx.rollback().await {
                        warn!(
                            purge_id,
                            scope = %summary.scope,
                            error = %rollback,
                            "rollback of failed retention batch failed"
                        );
                    }
                    return Err(e);
                }
            };
            drop(conn);

            summary.eligible += batch.selected;
            summary.held += batch.held;
            summary.purged += batch.purged;
            summary.skipped += batch.skipped;
            summary.batches += 1;
            debug!(
                purge_id,
                scope = %summary.scope,
                batch = summary.batches,
                selected = batch.selected,
                held = batch.held,
                purged = batch.purged,
                "retention batch committed"
            );

            if batch.selected < u64::from(request.batch_size) {
                return Ok(());
            }
            cursor = batch.last;
        }
    }

    /// Finalize `run` as partial and wrap `cause` with it.
    async fn abandon(&self, mut run: PurgeRun, cause: AuditError) -> AuditError {
        warn!(purge_id = %run.purge_id, error = %cause, "retention run stopped early");
        run.status = PurgeStatus::Partial;
        run.error = Some(cause.to_string());
        run.completed_at = Some(storage_precision(Utc::now()));
        let finalized = match self.db().gate().await {
            Ok(conn) => purge_runs::finalize(&conn, &run).await,
            Err(e) => Err(e),
        };
        if let Err(e) = finalized {
            error!(purge_id = %run.purge_id, error = %e, "could not record partial retention run");
        }
        AuditError::RetentionPartialFailure {
            run: Box::new(run),
            source: Box::new(cause),
        }
    }
}
