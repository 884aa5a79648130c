//! Per-chain write leases.
//!
//! One async mutex per chain scope, created on first use and dropped from
//! the registry once nobody holds or waits on it. A lease is held from the
//! tail read to the commit of the append, and released when the
//! [`TenantLease`] guard drops, on error paths included.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use custody_core::entities::ChainScope;
use tokio::sync::OwnedMutexGuard;

use crate::error::AuditError;

type Slot = Arc<tokio::sync::Mutex<()>>;

/// Registry of chain-scope leases. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct LeaseRegistry {
    slots: Arc<Mutex<HashMap<ChainScope, Slot>>>,
}

/// Exclusive right to append to one chain.
pub struct TenantLease {
    scope: ChainScope,
    guard: Option<OwnedMutexGuard<()>>,
    registry: LeaseRegistry,
}

impl LeaseRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait up to `wait` for the lease on `scope`.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Contention` if another holder keeps the lease
    /// past `wait`.
    pub async fn acquire(
        &self,
        scope: ChainScope,
        wait: Duration,
    ) -> Result<TenantLease, AuditError> {
        let slot = self.slot(&scope);
        let acquired = tokio::time::timeout(wait, slot.lock_owned()).await;
        match acquired {
            Ok(guard) => Ok(TenantLease {
                scope,
                guard: Some(guard),
                registry: self.clone(),
            }),
            Err(_) => {
                self.prune(&scope);
                let waited_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
                tracing::debug!(chain = %scope, waited_ms, "lease wait timed out");
                Err(AuditError::Contention {
                    resource: scope.to_string(),
                    waited_ms,
                })
            }
        }
    }

    /// Whether some task currently holds the lease on `scope`.
    #[must_use]
    pub fn is_held(&self, scope: &ChainScope) -> bool {
        self.lock_slots()
            .get(scope)
            .is_some_and(|slot| slot.try_lock().is_err())
    }

    /// Number of scopes with a live holder or waiter.
    #[must_use]
    pub fn active(&self) -> usize {
        self.lock_slots().len()
    }

    fn slot(&self, scope: &ChainScope) -> Slot {
        Arc::clone(self.lock_slots().entry(scope.clone()).or_default())
    }

    /// Remove the slot for `scope` if the registry holds the last reference.
    ///
    /// Waiters and holders each own a clone, and new ones can only appear
    /// under the registry lock, so a count of one means the slot is idle.
    fn prune(&self, scope: &ChainScope) {
        let mut slots = self.lock_slots();
        if slots.get(scope).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(scope);
        }
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<ChainScope, Slot>> {
        // The map is never left half-updated, so a poisoned lock is usable.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TenantLease {
    #[must_use]
    pub const fn scope(&self) -> &ChainScope {
        &self.scope
    }
}

impl Drop for TenantLease {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.registry.prune(&self.scope);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn tenant(id: &str) -> ChainScope {
        ChainScope::Tenant(id.into())
    }

    #[tokio::test]
    async fn other_tenant_acquires_immediately() {
        let registry = LeaseRegistry::new();
        let _a = registry
            .acquire(tenant("a"), Duration::from_secs(5))
            .await
            .unwrap();

        let started = Instant::now();
        let b = registry
            .acquire(tenant("b"), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(50));
        assert!(registry.is_held(b.scope()));
        assert_eq!(registry.active(), 2);
    }

    #[tokio::test]
    async fn same_tenant_times_out_with_contention() {
        let registry = LeaseRegistry::new();
        let _held = registry
            .acquire(tenant("a"), Duration::from_secs(5))
            .await
            .unwrap();

        let err = registry
            .acquire(tenant("a"), Duration::from_millis(20))
            .await
            .err()
            .unwrap();
        match err {
            AuditError::Contention {
                resource,
                waited_ms,
            } => {
                assert_eq!(resource, "tenant:a");
                assert_eq!(waited_ms, 20);
            }
            other => panic!("expected contention, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn global_chain_is_its_own_key() {
        let registry = LeaseRegistry::new();
        let _global = registry
            .acquire(ChainScope::Global, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(
            registry
                .acquire(tenant("a"), Duration::from_millis(10))
                .await
                .is_ok()
        );
        assert!(
            registry
                .acquire(ChainScope::Global, Duration::from_millis(10))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn drop_releases_and_prunes() {
        let registry = LeaseRegistry::new();
        let lease = registry
            .acquire(tenant("a"), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(registry.is_held(&tenant("a")));
        drop(lease);

        assert!(!registry.is_held(&tenant("a")));
        assert_eq!(registry.active(), 0);
        assert!(
            registry
                .acquire(tenant("a"), Duration::from_millis(10))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn waiter_gets_lease_after_release() {
        let registry = LeaseRegistry::new();
        let lease = registry
            .acquire(tenant("a"), Duration::from_secs(1))
            .await
            .unwrap();

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .acquire(tenant("a"), Duration::from_secs(5))
                    .await
                    .map(|_| ())
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(lease);

        waiter.await.unwrap().unwrap();
        assert_eq!(registry.active(), 0);
    }
}
