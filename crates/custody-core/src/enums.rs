//! Classification enums for audit entries, legal holds, and purge runs.
//!
//! All enums use `snake_case` serialization via `#[serde(rename_all = "snake_case")]`,
//! and `as_str()` returns the same string that is stored in SQL.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::CoreError;

// ---------------------------------------------------------------------------
// AuditScope
// ---------------------------------------------------------------------------

/// Audit category an entry belongs to.
///
/// Retention windows and legal holds are both keyed by scope, so every
/// entry carries exactly one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AuditScope {
    /// Privileged administrative actions (user management, role grants).
    Admin,
    /// Tenant or platform configuration changes.
    Config,
    /// Calls made by or to external integrations.
    Integration,
    /// Reads of sensitive records.
    Access,
    /// Actions the platform takes on its own (schedulers, migrations).
    System,
}

impl AuditScope {
    pub const ALL: [Self; 5] = [
        Self::Admin,
        Self::Config,
        Self::Integration,
        Self::Access,
        Self::System,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Config => "config",
            Self::Integration => "integration",
            Self::Access => "access",
            Self::System => "system",
        }
    }
}

impl fmt::Display for AuditScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditScope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "audit scope",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

/// Coarse read/write classification of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Read,
    Write,
    Delete,
    Execute,
}

impl ActionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::Execute => "execute",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Sensitivity
// ---------------------------------------------------------------------------

/// How sensitive the audited action or the touched resource is.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Low,
    Medium,
    High,
    Critical,
}

impl Sensitivity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActorType
// ---------------------------------------------------------------------------

/// Who initiated a purge run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    System,
    User,
}

impl ActorType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PurgeStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a purge run.
///
/// ```text
/// running → completed
///         → partial (a batch failed; committed batches stand)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeStatus {
    Running,
    Completed,
    Partial,
}

impl PurgeStatus {
    #[must_use]
    pub const fn allowed_next_states(self) -> &'static [Self] {
        match self {
            Self::Running => &[Self::Completed, Self::Partial],
            Self::Completed | Self::Partial => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next_states().contains(&next)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Partial => "partial",
        }
    }
}

impl fmt::Display for PurgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ScopeStatus
// ---------------------------------------------------------------------------

/// Outcome of one scope within a purge run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeStatus {
    /// A retention window is configured and the scope was scanned.
    Enabled,
    /// No retention window is configured; nothing was scanned.
    Disabled,
    /// The scope's batch loop stopped on an error.
    Failed,
}

impl ScopeStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ScopeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    macro_rules! test_serde_roundtrip {
        ($name:ident, $ty:ty, $variant:expr, $expected_str:expr) => {
            #[test]
            fn $name() {
                let val = $variant;
                let json = serde_json::to_string(&val).unwrap();
                assert_eq!(json, format!("\"{}\"", $expected_str));
                let recovered: $ty = serde_json::from_str(&json).unwrap();
                assert_eq!(recovered, val);
                assert_eq!(val.as_str(), $expected_str);
            }
        };
    }

    test_serde_roundtrip!(scope_admin, AuditScope, AuditScope::Admin, "admin");
    test_serde_roundtrip!(
        scope_integration,
        AuditScope,
        AuditScope::Integration,
        "integration"
    );
    test_serde_roundtrip!(kind_execute, ActionKind, ActionKind::Execute, "execute");
    test_serde_roundtrip!(
        sensitivity_critical,
        Sensitivity,
        Sensitivity::Critical,
        "critical"
    );
    test_serde_roundtrip!(actor_system, ActorType, ActorType::System, "system");
    test_serde_roundtrip!(purge_partial, PurgeStatus, PurgeStatus::Partial, "partial");
    test_serde_roundtrip!(
        scope_status_disabled,
        ScopeStatus,
        ScopeStatus::Disabled,
        "disabled"
    );

    #[rstest]
    #[case("admin", AuditScope::Admin)]
    #[case("config", AuditScope::Config)]
    #[case("integration", AuditScope::Integration)]
    #[case("access", AuditScope::Access)]
    #[case("system", AuditScope::System)]
    fn scope_parses_from_str(#[case] input: &str, #[case] expected: AuditScope) {
        assert_eq!(input.parse::<AuditScope>().unwrap(), expected);
    }

    #[test]
    fn unknown_scope_is_rejected() {
        let err = "billing".parse::<AuditScope>().unwrap_err();
        assert!(matches!(err, CoreError::UnknownVariant { kind: "audit scope", .. }));
    }

    #[test]
    fn purge_status_transitions() {
        assert!(PurgeStatus::Running.can_transition_to(PurgeStatus::Completed));
        assert!(PurgeStatus::Running.can_transition_to(PurgeStatus::Partial));
        assert!(!PurgeStatus::Completed.can_transition_to(PurgeStatus::Running));
        assert!(!PurgeStatus::Partial.can_transition_to(PurgeStatus::Completed));
    }
}
