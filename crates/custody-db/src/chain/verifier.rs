//! Chain verification.
//!
//! Each entry is checked two ways: its stored hash against a hash
//! recomputed from its stored fields and stored `prev_hash`, and its
//! `prev_hash` against the previous entry's stored hash. Comparing against
//! stored (not recomputed) hashes keeps one corrupted entry from
//! cascading into a break at every later position.
//!
//! A `prev_hash` that points at an entry removed by a sanctioned purge is
//! bridged through the purge links instead of being reported.

use std::collections::HashMap;

use custody_core::entities::{AuditEntry, ChainScope, PurgeLink, SENTINEL_HASH};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chain::codec;
use crate::error::AuditError;
use crate::repos::entries::{self, ENTRY_COLUMNS, row_to_entry};
use crate::retention::outstanding_sanctions;
use crate::service::AuditService;

/// What is wrong at a break.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakKind {
    /// `prev_hash` does not name the previous entry (or a purged run of
    /// entries ending at it).
    LinkMismatch { expected: String, found: String },
    /// The stored hash does not match the entry's contents.
    HashMismatch { stored: String, recomputed: String },
    /// The stored entry could not be re-encoded.
    Unreadable { reason: String },
}

/// One position where the chain fails verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBreak {
    /// Zero-based index among the entries currently stored for the chain.
    pub position: u64,
    pub entry_id: String,
    #[serde(flatten)]
    pub kind: BreakKind,
}

/// Outcome of verifying one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub tenant_id: Option<String>,
    pub entries_checked: u64,
    /// Purge gaps crossed via purge links.
    pub bridged_gaps: u64,
    /// Hash of the last entry checked.
    pub head_hash: Option<String>,
    /// The first breaks found, at most the requested maximum.
    pub breaks: Vec<ChainBreak>,
    /// More breaks existed than were recorded.
    pub truncated: bool,
    /// Purge sanction rows left committed in the store. Any such row lifts
    /// the delete guard, so the chain cannot be vouched for while it exists.
    #[serde(default)]
    pub outstanding_sanctions: u64,
}

impl ChainReport {
    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.breaks.is_empty() && !self.truncated && self.outstanding_sanctions == 0
    }
}

/// Incremental verifier. Feed entries in chain order, then call
/// [`ChainWalker::finish`].
pub struct ChainWalker {
    tenant_id: Option<String>,
    /// Purged entry hash -> its `prev_hash`.
    purged: HashMap<String, String>,
    expected: String,
    position: u64,
    bridged_gaps: u64,
    max_breaks: usize,
    breaks: Vec<ChainBreak>,
    truncated: bool,
}

impl ChainWalker {
    /// Start a walk over `chain`. `max_breaks` of zero still detects a
    /// break (the report is marked truncated) but records none.
    #[must_use]
    pub fn new(chain: &ChainScope, links: Vec<PurgeLink>, max_breaks: usize) -> Self {
        Self {
            tenant_id: chain.tenant_id().map(String::from),
            purged: links.into_iter().map(|l| (l.hash, l.prev_hash)).collect(),
            expected: SENTINEL_HASH.to_string(),
            position: 0,
            bridged_gaps: 0,
            max_breaks,
            breaks: Vec::new(),
            truncated: false,
        }
    }

    /// Check the next entry. Returns `false` once enough breaks are
    /// recorded and the walk can stop.
    pub fn check(&mut self, entry: &AuditEntry) -> bool {
        let kind = match codec::entry_hash(entry) {
            Err(e) => Some(BreakKind::Unreadable {
                reason: e.to_string(),
            }),
            Ok(recomputed) if recomputed != entry.hash => Some(BreakKind::HashMismatch {
                stored: entry.hash.clone(),
                recomputed,
            }),
            Ok(_) if entry.prev_hash == self.expected => None,
            Ok(_) if self.bridges(&entry.prev_hash) => {
                self.bridged_gaps += 1;
                None
            }
            Ok(_) => Some(BreakKind::LinkMismatch {
                expected: self.expected.clone(),
                found: entry.prev_hash.clone(),
            }),
        };

        if let Some(kind) = kind {
            if self.breaks.len() < self.max_breaks {
                self.breaks.push(ChainBreak {
                    position: self.position,
                    entry_id: entry.entry_id.clone(),
                    kind,
                });
            } else {
                self.truncated = true;
            }
        }

        self.expected.clone_from(&entry.hash);
        self.position += 1;
        !self.truncated
    }

    /// Whether `found` reaches the expected hash by following purge links.
    fn bridges(&self, found: &str) -> bool {
        let mut cursor = found;
        // Each hop consumes one link; more hops than links means a cycle.
        for _ in 0..=self.purged.len() {
            if cursor == self.expected {
                return true;
            }
            match self.purged.get(cursor) {
                Some(prev) => cursor = prev,
                None => return false,
            }
        }
        false
    }

    #[must_use]
    pub fn finish(self) -> ChainReport {
        ChainReport {
            tenant_id: self.tenant_id,
            entries_checked: self.position,
            bridged_gaps: self.bridged_gaps,
            head_hash: (self.position > 0).then_some(self.expected),
            breaks: self.breaks,
            truncated: self.truncated,
            outstanding_sanctions: 0,
        }
    }
}

impl AuditService {
    /// Whether the chain of `tenant_id` (`None` = global chain) verifies.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the chain cannot be read.
    pub async fn verify_chain(&self, tenant_id: Option<&str>) -> Result<bool, AuditError> {
        Ok(self.verify_chain_report(tenant_id, 1).await?.is_intact())
    }

    /// Verify a chain and report up to `max_breaks` breaks in chain order.
    ///
    /// Reads inside one transaction; appends that commit during the walk are
    /// not seen.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the chain cannot be read.
    pub async fn verify_chain_report(
        &self,
        tenant_id: Option<&str>,
        max_breaks: usize,
    ) -> Result<ChainReport, AuditError> {
        let chain = ChainScope::from_tenant(tenant_id);
        let conn = self.db().gate().await?;
        let tx = conn.transaction().await?;
        let result = walk(&tx, &chain, max_breaks).await;
        // Read-only: nothing to keep.
        if let Err(e) = tx.rollback().await {
            warn!(chain = %chain, error = %e, "rollback after verification failed");
        }
        let report = result?;

        if report.is_intact() {
            info!(
                chain = %chain,
                entries = report.entries_checked,
                bridged_gaps = report.bridged_gaps,
                "chain verified"
            );
        } else {
            warn!(
                chain = %chain,
                entries = report.entries_checked,
                breaks = report.breaks.len(),
                first_break = report.breaks.first().map(|b| b.entry_id.as_str()),
                outstanding_sanctions = report.outstanding_sanctions,
                "chain verification failed"
            );
        }
        Ok(report)
    }
}

async fn walk(
    conn: &libsql::Connection,
    chain: &ChainScope,
    max_breaks: usize,
) -> Result<ChainReport, AuditError> {
    let outstanding = outstanding_sanctions(conn).await?;
    let links = entries::purge_links_for_chain(conn, chain.tenant_id()).await?;
    let mut walker = ChainWalker::new(chain, links, max_breaks);

    let mut rows = conn
        .query(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM audit_entries
                 WHERE tenant_id IS ?1
                 ORDER BY created_at, entry_id"
            ),
            libsql::params![chain.tenant_id()],
        )
        .await?;
    while let Some(row) = rows.next().await? {
        if !walker.check(&row_to_entry(&row)?) {
            break;
        }
    }
    Ok(ChainReport {
        outstanding_sanctions: outstanding,
        ..walker.finish()
    })
}
