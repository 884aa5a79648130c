use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{ActorType, AuditScope, PurgeStatus, ScopeStatus};

/// One execution of the retention engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurgeRun {
    pub purge_id: String,
    pub actor_type: ActorType,
    pub actor_id: String,
    pub dry_run: bool,
    /// Retention configuration in effect when the run started.
    pub policy_snapshot: serde_json::Value,
    pub summary: PurgeSummary,
    pub status: PurgeStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Per-scope outcome of a purge run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurgeSummary {
    pub scopes: Vec<ScopeSummary>,
}

impl PurgeSummary {
    #[must_use]
    pub fn scope(&self, scope: AuditScope) -> Option<&ScopeSummary> {
        self.scopes.iter().find(|s| s.scope == scope)
    }

    #[must_use]
    pub fn total_purged(&self) -> u64 {
        self.scopes.iter().map(|s| s.purged).sum()
    }

    #[must_use]
    pub fn total_held(&self) -> u64 {
        self.scopes.iter().map(|s| s.held).sum()
    }

    #[must_use]
    pub fn total_skipped(&self) -> u64 {
        self.scopes.iter().map(|s| s.skipped).sum()
    }
}

/// Counts for one scope.
///
/// `eligible` is every entry past the cutoff. Each of those ends up in
/// exactly one of `purged`, `held` (covered by an active hold), or `skipped`
/// (left in place because the run was a dry run).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopeSummary {
    pub scope: AuditScope,
    pub status: ScopeStatus,
    pub retention_days: Option<u32>,
    pub cutoff: Option<DateTime<Utc>>,
    pub eligible: u64,
    pub purged: u64,
    pub held: u64,
    pub skipped: u64,
    pub batches: u32,
}

impl ScopeSummary {
    /// Summary for a scope with no retention window configured.
    #[must_use]
    pub const fn disabled(scope: AuditScope) -> Self {
        Self {
            scope,
            status: ScopeStatus::Disabled,
            retention_days: None,
            cutoff: None,
            eligible: 0,
            purged: 0,
            held: 0,
            skipped: 0,
            batches: 0,
        }
    }

    /// Empty summary for a scope about to be scanned.
    #[must_use]
    pub const fn enabled(scope: AuditScope, retention_days: u32, cutoff: DateTime<Utc>) -> Self {
        Self {
            scope,
            status: ScopeStatus::Enabled,
            retention_days: Some(retention_days),
            cutoff: Some(cutoff),
            eligible: 0,
            purged: 0,
            held: 0,
            skipped: 0,
            batches: 0,
        }
    }
}

/// Link metadata of a purged entry.
///
/// Kept after the entry is deleted so the verifier can tell a sanctioned gap
/// from a forged link. Carries no payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurgeLink {
    pub hash: String,
    pub tenant_id: Option<String>,
    pub prev_hash: String,
    pub created_at: DateTime<Utc>,
    pub purge_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_across_scopes() {
        let now = Utc::now();
        let mut admin = ScopeSummary::enabled(AuditScope::Admin, 30, now);
        admin.purged = 3;
        admin.held = 1;
        let mut config = ScopeSummary::enabled(AuditScope::Config, 90, now);
        config.purged = 2;
        config.skipped = 4;
        let summary = PurgeSummary {
            scopes: vec![admin, config, ScopeSummary::disabled(AuditScope::System)],
        };

        assert_eq!(summary.total_purged(), 5);
        assert_eq!(summary.total_held(), 1);
        assert_eq!(summary.total_skipped(), 4);
        assert_eq!(
            summary.scope(AuditScope::System).map(|s| s.status),
            Some(ScopeStatus::Disabled)
        );
        assert!(summary.scope(AuditScope::Access).is_none());
    }
}
