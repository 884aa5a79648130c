use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::entry::{AuditEntry, EntryStub};
use crate::enums::AuditScope;
use crate::errors::CoreError;

/// A standing exception to retention for entries of one scope.
///
/// Releasing a hold only fills the `released_*` fields; every other field is
/// fixed at creation and the row is never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegalHold {
    pub hold_id: String,
    /// `None` applies the hold to every tenant (and the global chain).
    pub tenant_id: Option<String>,
    pub scope: AuditScope,
    pub applies_from: Option<DateTime<Utc>>,
    pub applies_to: Option<DateTime<Utc>>,
    pub investigation_id: String,
    pub reason: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub released_by: Option<String>,
    pub release_reason: Option<String>,
}

/// Anything a legal hold can cover.
pub trait HoldSubject {
    fn subject_tenant(&self) -> Option<&str>;
    fn subject_scope(&self) -> AuditScope;
    fn subject_created_at(&self) -> DateTime<Utc>;
}

impl HoldSubject for AuditEntry {
    fn subject_tenant(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    fn subject_scope(&self) -> AuditScope {
        self.scope
    }

    fn subject_created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl HoldSubject for EntryStub {
    fn subject_tenant(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    fn subject_scope(&self) -> AuditScope {
        self.scope
    }

    fn subject_created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl LegalHold {
    /// Whether the hold is in force at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.released_at.is_none_or(|released| released > now)
    }

    /// Whether this hold protects `subject` from deletion at `now`.
    ///
    /// Open window bounds are treated as unbounded, so a hold with no
    /// `applies_to` keeps covering new in-scope entries until released.
    #[must_use]
    pub fn covers<S: HoldSubject + ?Sized>(&self, subject: &S, now: DateTime<Utc>) -> bool {
        if !self.is_active_at(now) || self.scope != subject.subject_scope() {
            return false;
        }
        if let Some(tenant) = self.tenant_id.as_deref() {
            if subject.subject_tenant() != Some(tenant) {
                return false;
            }
        }
        let created_at = subject.subject_created_at();
        self.applies_from.is_none_or(|from| created_at >= from)
            && self.applies_to.is_none_or(|to| created_at <= to)
    }
}

/// Whether any hold in `holds` covers `subject` at `now`.
#[must_use]
pub fn is_covered<S: HoldSubject + ?Sized>(
    holds: &[LegalHold],
    subject: &S,
    now: DateTime<Utc>,
) -> bool {
    holds.iter().any(|hold| hold.covers(subject, now))
}

/// Input for creating a legal hold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewHold {
    pub tenant_id: Option<String>,
    pub scope: AuditScope,
    pub applies_from: Option<DateTime<Utc>>,
    pub applies_to: Option<DateTime<Utc>>,
    pub investigation_id: String,
    pub reason: String,
    pub created_by: String,
}

impl NewHold {
    /// Check the hold window and required fields.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` when the window is inverted or a
    /// required text field is blank.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let (Some(from), Some(to)) = (self.applies_from, self.applies_to) {
            if from > to {
                return Err(CoreError::Validation(format!(
                    "hold window is inverted: applies_from {from} is after applies_to {to}"
                )));
            }
        }
        for (field, value) in [
            ("investigation_id", &self.investigation_id),
            ("reason", &self.reason),
            ("created_by", &self.created_by),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::Validation(format!("{field} must not be empty")));
            }
        }
        if self.tenant_id.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(CoreError::Validation(
                "tenant_id must be omitted, not empty, for a cross-tenant hold".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    use super::*;

    fn hold(tenant: Option<&str>, scope: AuditScope) -> LegalHold {
        LegalHold {
            hold_id: "hld-1".into(),
            tenant_id: tenant.map(String::from),
            scope,
            applies_from: None,
            applies_to: None,
            investigation_id: "inv-7".into(),
            reason: "litigation".into(),
            created_by: "u-legal".into(),
            created_at: Utc::now(),
            released_at: None,
            released_by: None,
            release_reason: None,
        }
    }

    fn stub(tenant: Option<&str>, scope: AuditScope, created_at: DateTime<Utc>) -> EntryStub {
        EntryStub {
            entry_id: "aud-1".into(),
            tenant_id: tenant.map(String::from),
            scope,
            created_at,
            prev_hash: String::new(),
            hash: String::new(),
        }
    }

    #[test]
    fn open_hold_covers_matching_entry() {
        let now = Utc::now();
        let h = hold(Some("t-1"), AuditScope::Admin);
        assert!(h.covers(&stub(Some("t-1"), AuditScope::Admin, now), now));
    }

    #[test]
    fn scope_and_tenant_must_match() {
        let now = Utc::now();
        let h = hold(Some("t-1"), AuditScope::Admin);
        assert!(!h.covers(&stub(Some("t-1"), AuditScope::Config, now), now));
        assert!(!h.covers(&stub(Some("t-2"), AuditScope::Admin, now), now));
        assert!(!h.covers(&stub(None, AuditScope::Admin, now), now));
    }

    #[test]
    fn global_hold_covers_every_tenant() {
        let now = Utc::now();
        let h = hold(None, AuditScope::Integration);
        assert!(h.covers(&stub(Some("t-9"), AuditScope::Integration, now), now));
        assert!(h.covers(&stub(None, AuditScope::Integration, now), now));
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let now = Utc::now();
        let from = now - Duration::days(10);
        let to = now - Duration::days(5);
        let mut h = hold(None, AuditScope::Admin);
        h.applies_from = Some(from);
        h.applies_to = Some(to);

        assert!(h.covers(&stub(None, AuditScope::Admin, from), now));
        assert!(h.covers(&stub(None, AuditScope::Admin, to), now));
        assert!(!h.covers(&stub(None, AuditScope::Admin, from - Duration::seconds(1)), now));
        assert!(!h.covers(&stub(None, AuditScope::Admin, to + Duration::seconds(1)), now));
    }

    #[test]
    fn released_hold_stops_covering() {
        let now = Utc::now();
        let mut h = hold(None, AuditScope::Admin);
        h.released_at = Some(now - Duration::minutes(1));
        assert!(!h.is_active_at(now));
        assert!(!is_covered(&[h], &stub(None, AuditScope::Admin, now), now));
    }

    #[test]
    fn validate_rejects_inverted_window() {
        let now = Utc::now();
        let new = NewHold {
            tenant_id: None,
            scope: AuditScope::Admin,
            applies_from: Some(now),
            applies_to: Some(now - Duration::days(1)),
            investigation_id: "inv-1".into(),
            reason: "r".into(),
            created_by: "u".into(),
        };
        let err = new.validate().unwrap_err();
        assert!(err.to_string().contains("inverted"), "{err}");
    }

    #[test]
    fn validate_rejects_blank_fields() {
        let new = NewHold {
            tenant_id: None,
            scope: AuditScope::Admin,
            applies_from: None,
            applies_to: None,
            investigation_id: "  ".into(),
            reason: "r".into(),
            created_by: "u".into(),
        };
        assert_eq!(
            new.validate().unwrap_err().to_string(),
            "Validation error: investigation_id must not be empty"
        );
    }
}
