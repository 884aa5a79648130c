//! Error types for custody-db.
//!
//! `AuditError` is the single error surfaced by every chain, hold, and
//! retention operation. Storage aborts raised by the immutability guard
//! triggers are recognized by their `custody_guard:` marker and surface as
//! `IntegrityViolation`, never as a generic database error.

use custody_core::entities::PurgeRun;
use custody_core::errors::CoreError;
use thiserror::Error;

/// Marker prefix carried by every `RAISE(ABORT, ...)` in the guard triggers.
pub const GUARD_MARKER: &str = "custody_guard:";

/// Errors from audit trail operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The tenant lease (or the store gate) was not acquired in time.
    /// Retryable.
    #[error("Contention on {resource}: not acquired within {waited_ms} ms")]
    Contention { resource: String, waited_ms: u64 },

    /// An entry payload could not be canonicalized. Not retryable until the
    /// payload is fixed.
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// The storage layer rejected an update or an unsanctioned delete.
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    /// A purge batch failed. Batches committed before it stand; `run` is the
    /// partial record that was persisted.
    #[error("Retention run {} stopped early: {source}", .run.purge_id)]
    RetentionPartialFailure {
        run: Box<PurgeRun>,
        #[source]
        source: Box<AuditError>,
    },

    /// A legal hold request was malformed.
    #[error("Invalid legal hold: {0}")]
    HoldValidation(String),

    /// A caller-supplied argument was out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Entity lookup returned no result.
    #[error("Not found: {entity_type} {id}")]
    NotFound { entity_type: String, id: String },

    /// A SQL query failed or returned malformed data.
    #[error("Query failed: {0}")]
    Query(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[source] libsql::Error),
}

impl AuditError {
    /// Whether the caller may retry the same call unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention { .. })
    }
}

impl From<libsql::Error> for AuditError {
    fn from(e: libsql::Error) -> Self {
        let msg = e.to_string();
        match msg.find(GUARD_MARKER) {
            Some(at) => Self::IntegrityViolation(msg[at + GUARD_MARKER.len()..].trim().to_string()),
            None => Self::LibSql(e),
        }
    }
}

impl From<CoreError> for AuditError {
    fn from(e: CoreError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}
