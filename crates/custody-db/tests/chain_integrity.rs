//! Chain integrity integration tests.
//!
//! - Writer: concurrent appends, tenant independence, contention
//! - Immutability guard: updates and unsanctioned deletes rejected
//! - Verifier: out-of-band tampering detected at the right entry

use std::sync::Arc;
use std::time::Duration;

use custody_config::CustodyConfig;
use custody_core::entities::{ActionSpec, Actor, ChainScope, NewEntry, NewHold, SENTINEL_HASH};
use custody_core::enums::{ActionKind, AuditScope, Sensitivity};
use custody_db::chain::BreakKind;
use custody_db::error::AuditError;
use custody_db::service::AuditService;
use pretty_assertions::assert_eq;
use serde_json::json;

async fn test_service() -> AuditService {
    AuditService::new_local(":memory:").await.unwrap()
}

async fn test_service_with_wait(lock_wait_ms: u64) -> AuditService {
    let mut config = CustodyConfig::default();
    config.store.path = ":memory:".into();
    config.store.lock_wait_ms = lock_wait_ms;
    AuditService::open(config).await.unwrap()
}

fn booking_cancel(tenant: &str, n: usize) -> NewEntry {
    NewEntry::for_tenant(
        tenant,
        Actor::new("u-dispatch", "dispatcher", "password"),
        ActionSpec::new("booking.cancel", AuditScope::Admin, ActionKind::Write)
            .with_sensitivity(Sensitivity::High),
        "booking",
    )
    .resource_id(format!("bk-{n}"))
    .before(&json!({"status": "confirmed", "n": n}))
    .after(&json!({"status": "cancelled", "n": n}))
}

/// Run raw SQL the way an operator with a database shell would.
async fn raw_execute(svc: &AuditService, sql: &str) -> Result<u64, AuditError> {
    let conn = svc.db().gate().await?;
    Ok(conn.execute(sql, ()).await?)
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_appends_to_one_tenant_form_a_linked_chain() {
    let svc = Arc::new(test_service().await);
    let mut handles = Vec::new();
    for n in 0..40 {
        let svc = Arc::clone(&svc);
        handles.push(tokio::spawn(async move {
            svc.record_action(booking_cancel("t-busy", n)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let chain = svc.chain_entries(Some("t-busy")).await.unwrap();
    assert_eq!(chain.len(), 40);
    assert_eq!(chain[0].prev_hash, SENTINEL_HASH);
    for pair in chain.windows(2) {
        assert_eq!(pair[1].prev_hash, pair[0].hash);
        assert!(pair[0].created_at < pair[1].created_at);
    }
    assert!(svc.verify_chain(Some("t-busy")).await.unwrap());
}

#[tokio::test]
async fn two_simultaneous_appends_reference_each_other() {
    let svc = Arc::new(test_service().await);
    let (a, b) = tokio::join!(
        {
            let svc = Arc::clone(&svc);
            async move { svc.record_action(booking_cancel("t-1", 1)).await }
        },
        {
            let svc = Arc::clone(&svc);
            async move { svc.record_action(booking_cancel("t-1", 2)).await }
        }
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    let (first, second) = if a.created_at < b.created_at {
        (a, b)
    } else {
        (b, a)
    };
    assert_eq!(first.prev_hash, SENTINEL_HASH);
    assert_eq!(second.prev_hash, first.hash);
}

#[tokio::test]
async fn interleaved_tenants_keep_independent_chains() {
    let svc = Arc::new(test_service().await);
    let mut handles = Vec::new();
    for n in 0..30 {
        let svc = Arc::clone(&svc);
        let tenant = ["t-a", "t-b", "t-c"][n % 3];
        handles.push(tokio::spawn(async move {
            svc.record_action(booking_cancel(tenant, n)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for tenant in ["t-a", "t-b", "t-c"] {
        let chain = svc.chain_entries(Some(tenant)).await.unwrap();
        assert_eq!(chain.len(), 10, "{tenant}");
        assert!(chain.iter().all(|e| e.tenant_id.as_deref() == Some(tenant)));
        assert!(svc.verify_chain(Some(tenant)).await.unwrap(), "{tenant}");
    }
}

#[tokio::test]
async fn held_lease_blocks_only_its_own_tenant() {
    let svc = test_service_with_wait(50).await;
    let lease_a = svc
        .leases()
        .acquire(ChainScope::Tenant("t-a".into()), Duration::from_secs(1))
        .await
        .unwrap();

    svc.record_action(booking_cancel("t-b", 1)).await.unwrap();

    let err = svc.record_action(booking_cancel("t-a", 1)).await.unwrap_err();
    assert!(
        matches!(err, AuditError::Contention { ref resource, .. } if resource == "tenant:t-a"),
        "{err}"
    );
    assert!(err.is_retryable());

    drop(lease_a);
    svc.record_action(booking_cancel("t-a", 2)).await.unwrap();
}

#[tokio::test]
async fn global_chain_is_separate_from_tenants() {
    let svc = test_service().await;
    svc.record_action(booking_cancel("t-1", 1)).await.unwrap();
    let sys = svc
        .record_system_action(
            None,
            ActionSpec::new("retention.schedule", AuditScope::System, ActionKind::Execute),
            "scheduler",
            None,
            Some(json!({"cron": "0 3 * * *"})),
        )
        .await
        .unwrap();

    assert_eq!(sys.tenant_id, None);
    assert_eq!(sys.prev_hash, SENTINEL_HASH);
    assert_eq!(svc.chain_entries(None).await.unwrap(), vec![sys]);
    assert!(svc.verify_chain(None).await.unwrap());
}

// ---------------------------------------------------------------------------
// Immutability guard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_is_rejected_and_hash_unchanged() {
    let svc = test_service().await;
    let entry = svc.record_action(booking_cancel("t-1", 1)).await.unwrap();

    let err = raw_execute(
        &svc,
        &format!(
            "UPDATE audit_entries SET actor_id = 'u-mallory' WHERE entry_id = '{}'",
            entry.entry_id
        ),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AuditError::IntegrityViolation(_)), "{err}");

    let stored = svc.get_entry(&entry.entry_id).await.unwrap();
    assert_eq!(stored.hash, entry.hash);
    assert_eq!(stored.actor_id, "u-dispatch");
}

#[tokio::test]
async fn unsanctioned_delete_is_rejected() {
    let svc = test_service().await;
    let entry = svc.record_action(booking_cancel("t-1", 1)).await.unwrap();

    let err = raw_execute(&svc, "DELETE FROM audit_entries").await.unwrap_err();
    assert!(matches!(err, AuditError::IntegrityViolation(_)), "{err}");
    assert!(svc.get_entry(&entry.entry_id).await.is_ok());
}

#[tokio::test]
async fn hold_and_purge_records_are_guarded() {
    let svc = test_service().await;
    svc.run_retention(true, 10).await.unwrap();
    svc.create_hold(NewHold {
        tenant_id: Some("t-1".into()),
        scope: AuditScope::Admin,
        applies_from: None,
        applies_to: None,
        investigation_id: "inv-1".into(),
        reason: "audit".into(),
        created_by: "u-counsel".into(),
    })
    .await
    .unwrap();

    for sql in [
        "DELETE FROM legal_holds",
        "UPDATE legal_holds SET reason = 'nothing to see'",
        "DELETE FROM purge_runs",
        "UPDATE purge_runs SET status = 'partial'",
        "INSERT INTO purge_links (hash, tenant_id, prev_hash, created_at, purge_id) \
         SELECT 'x', NULL, 'y', '2026-01-01T00:00:00.000000Z', purge_id FROM purge_runs",
    ] {
        let err = raw_execute(&svc, sql).await.unwrap_err();
        assert!(matches!(err, AuditError::IntegrityViolation(_)), "{sql}: {err}");
    }
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

#[tokio::test]
async fn out_of_band_tamper_is_reported_at_that_entry() {
    let svc = test_service().await;
    let mut written = Vec::new();
    for n in 0..5 {
        written.push(svc.record_action(booking_cancel("t-1", n)).await.unwrap());
    }
    assert!(svc.verify_chain(Some("t-1")).await.unwrap());

    // Someone with file access drops the guard and rewrites history.
    raw_execute(&svc, "DROP TRIGGER audit_entries_reject_update")
        .await
        .unwrap();
    raw_execute(
        &svc,
        &format!(
            "UPDATE audit_entries SET after_state = '{{\"status\":\"confirmed\"}}' \
             WHERE entry_id = '{}'",
            written[2].entry_id
        ),
    )
    .await
    .unwrap();

    assert!(!svc.verify_chain(Some("t-1")).await.unwrap());
    let report = svc.verify_chain_report(Some("t-1"), 10).await.unwrap();
    assert_eq!(report.breaks.len(), 1);
    assert_eq!(report.breaks[0].position, 2);
    assert_eq!(report.breaks[0].entry_id, written[2].entry_id);
    assert!(matches!(report.breaks[0].kind, BreakKind::HashMismatch { .. }));

    // Other tenants are unaffected.
    svc.record_action(booking_cancel("t-2", 1)).await.unwrap();
    assert!(svc.verify_chain(Some("t-2")).await.unwrap());
}

#[tokio::test]
async fn rewritten_hash_breaks_the_following_link() {
    let svc = test_service().await;
    let mut written = Vec::new();
    for n in 0..4 {
        written.push(svc.record_action(booking_cancel("t-1", n)).await.unwrap());
    }

    raw_execute(&svc, "DROP TRIGGER audit_entries_reject_update")
        .await
        .unwrap();
    raw_execute(
        &svc,
        &format!(
            "UPDATE audit_entries SET hash = '{}' WHERE entry_id = '{}'",
            "f".repeat(64),
            written[1].entry_id
        ),
    )
    .await
    .unwrap();

    let report = svc.verify_chain_report(Some("t-1"), 10).await.unwrap();
    assert_eq!(report.breaks[0].entry_id, written[1].entry_id);
    assert!(matches!(report.breaks[0].kind, BreakKind::HashMismatch { .. }));
    assert_eq!(report.breaks[1].entry_id, written[2].entry_id);
    assert!(matches!(report.breaks[1].kind, BreakKind::LinkMismatch { .. }));
    assert_eq!(report.breaks.len(), 2);
}

#[tokio::test]
async fn forced_delete_is_a_link_break() {
    let svc = test_service().await;
    let mut written = Vec::new();
    for n in 0..3 {
        written.push(svc.record_action(booking_cancel("t-1", n)).await.unwrap());
    }

    raw_execute(&svc, "DROP TRIGGER audit_entries_guard_delete")
        .await
        .unwrap();
    raw_execute(
        &svc,
        &format!(
            "DELETE FROM audit_entries WHERE entry_id = '{}'",
            written[1].entry_id
        ),
    )
    .await
    .unwrap();

    let report = svc.verify_chain_report(Some("t-1"), 10).await.unwrap();
    assert_eq!(report.breaks.len(), 1);
    assert_eq!(report.breaks[0].entry_id, written[2].entry_id);
    assert_eq!(
        report.breaks[0].kind,
        BreakKind::LinkMismatch {
            expected: written[0].hash.clone(),
            found: written[1].hash.clone(),
        }
    );
}

#[tokio::test]
async fn unknown_chain_verifies_empty() {
    let svc = test_service().await;
    let report = svc.verify_chain_report(Some("t-none"), 5).await.unwrap();
    assert!(report.is_intact());
    assert_eq!(report.entries_checked, 0);
}
