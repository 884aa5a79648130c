/// Upper bound on rows any listing command asks the store for.
pub const MAX_LIMIT: u32 = 1_000;

/// Resolve a listing limit: local arg, then the global `--limit`, then
/// `fallback`. Zero and oversized values are pulled into `1..=MAX_LIMIT`.
#[must_use]
pub fn effective_limit(local: Option<u32>, global: Option<u32>, fallback: u32) -> u32 {
    local.or(global).unwrap_or(fallback).clamp(1, MAX_LIMIT)
}
