//! Repository modules for every custody record.
//!
//! Each module adds read methods to `AuditService` via `impl AuditService`
//! blocks, plus crate-private statements that the writer and the retention
//! engine run inside their own transactions.

pub mod entries;
pub mod holds;
pub mod purge_runs;
