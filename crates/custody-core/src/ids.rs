//! ID prefix constants and generation.
//!
//! Every persisted record gets a prefixed ID of the form `{prefix}-{uuid}`,
//! where the UUID is a v4 rendered without hyphens. The prefix makes IDs
//! self-describing in logs and CLI output.

use uuid::Uuid;

pub const PREFIX_ENTRY: &str = "aud";
pub const PREFIX_HOLD: &str = "hld";
pub const PREFIX_PURGE: &str = "prg";
/// Transient purge sanction tokens; never outlive one transaction.
pub const PREFIX_SANCTION: &str = "snc";

pub const ALL_PREFIXES: &[&str] = &[PREFIX_ENTRY, PREFIX_HOLD, PREFIX_PURGE, PREFIX_SANCTION];

/// Generate a new globally unique ID with the given prefix.
#[must_use]
pub fn generate(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

/// Return the prefix part of an ID, if it has one we recognize.
#[must_use]
pub fn prefix_of(id: &str) -> Option<&'static str> {
    let (prefix, _) = id.split_once('-')?;
    ALL_PREFIXES.iter().copied().find(|p| *p == prefix)
}
