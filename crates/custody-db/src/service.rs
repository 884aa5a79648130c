//! Service layer for the audit trail.
//!
//! `AuditService` wraps `CustodyDb` (raw database access), the per-chain
//! `LeaseRegistry`, and the loaded configuration. Chain, hold, and
//! retention operations are implemented as `impl AuditService` blocks in
//! their own modules.

use custody_config::CustodyConfig;
use tracing::{info, warn};

use crate::chain::lease::LeaseRegistry;
use crate::error::AuditError;
use crate::{CustodyDb, StorageConcurrency};

/// The library boundary of the custody store.
///
/// Append protocol:
/// 1. Validate and canonicalize payloads (no lock held)
/// 2. Acquire the chain's lease (bounded wait)
/// 3. Read the chain tail and compute the new hash in one transaction
/// 4. Insert and commit
/// 5. Release the lease on drop
pub struct AuditService {
    db: CustodyDb,
    leases: LeaseRegistry,
    config: CustodyConfig,
}

impl AuditService {
    /// Open the store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the database cannot be opened or migrations
    /// fail.
    pub async fn open(config: CustodyConfig) -> Result<Self, AuditError> {
        let db = CustodyDb::open(&config.store).await?;
        info!(path = %config.store.path, "custody store opened");
        Ok(Self::from_db(db, config))
    }

    /// Open a local database with otherwise default configuration.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the libSQL database file, or `":memory:"` for tests.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the database cannot be opened.
    pub async fn new_local(db_path: &str) -> Result<Self, AuditError> {
        let mut config = CustodyConfig::default();
        config.store.path = db_path.to_string();
        Self::open(config).await
    }

    /// Create from an existing `CustodyDb` (for testing).
    #[must_use]
    pub fn from_db(db: CustodyDb, config: CustodyConfig) -> Self {
        if db.concurrency() == StorageConcurrency::SingleWriter {
            warn!(
                "store admits one writer transaction at a time; \
                 appends on different tenants queue on the store gate"
            );
        }
        Self {
            db,
            leases: LeaseRegistry::new(),
            config,
        }
    }

    /// Access the underlying database handle.
    #[must_use]
    pub const fn db(&self) -> &CustodyDb {
        &self.db
    }

    /// Per-chain write leases.
    #[must_use]
    pub const fn leases(&self) -> &LeaseRegistry {
        &self.leases
    }

    #[must_use]
    pub const fn config(&self) -> &CustodyConfig {
        &self.config
    }

    /// Run the embedded migrations again, e.g. after a schema repair.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Migration` if a statement fails.
    pub async fn migrate(&self) -> Result<(), AuditError> {
        self.db.run_migrations().await
    }
}
