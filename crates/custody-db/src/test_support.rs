//! Shared test utilities for custody-db unit tests.

#[cfg(test)]
pub(crate) mod helpers {
    use custody_config::CustodyConfig;
    use custody_core::entities::{ActionSpec, Actor, NewEntry, NewHold};
    use custody_core::enums::{ActionKind, AuditScope};

    use crate::service::AuditService;

    /// Create an in-memory `AuditService` with default configuration.
    pub async fn test_service() -> AuditService {
        test_service_with(CustodyConfig::default()).await
    }

    /// Create an in-memory `AuditService` with a specific configuration.
    pub async fn test_service_with(mut config: CustodyConfig) -> AuditService {
        config.store.path = ":memory:".into();
        AuditService::open(config).await.unwrap()
    }

    /// An admin write on an invoice, by a human operator.
    pub fn admin_action(tenant: &str) -> NewEntry {
        NewEntry::for_tenant(
            tenant,
            Actor::new("u-ops", "admin", "password"),
            ActionSpec::new("invoice.void", AuditScope::Admin, ActionKind::Write),
            "invoice",
        )
    }

    /// An open-ended hold for `scope`.
    pub fn new_hold(tenant: Option<&str>, scope: AuditScope) -> NewHold {
        NewHold {
            tenant_id: tenant.map(String::from),
            scope,
            applies_from: None,
            applies_to: None,
            investigation_id: "inv-2026-001".into(),
            reason: "pending litigation".into(),
            created_by: "u-counsel".into(),
        }
    }
}
