//! Cross-cutting error types for custody.
//!
//! Storage-specific errors (`AuditError`) live in `custody-db`. This module
//! only covers failures that core types can raise on their own, such as
//! parsing a scope name or validating a hold window.

use thiserror::Error;

/// Errors raised by core types before anything touches storage.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A string did not name a known enum variant.
    #[error("Unknown {kind} '{value}'")]
    UnknownVariant { kind: &'static str, value: String },

    /// Data failed validation (format, constraints).
    #[error("Validation error: {0}")]
    Validation(String),
}
