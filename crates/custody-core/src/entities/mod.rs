//! Entity structs for every persisted custody record.
//!
//! Each entity maps to a table in the libSQL database (see
//! `custody-db/migrations/001_audit_chain.sql`). All structs derive
//! `Serialize` and `Deserialize` for JSON output and snapshot columns.

mod entry;
mod hold;
mod purge;

pub use entry::{ActionSpec, Actor, AuditEntry, ChainScope, EntryStub, NewEntry, SENTINEL_HASH};
pub use hold::{HoldSubject, LegalHold, NewHold, is_covered};
pub use purge::{PurgeLink, PurgeRun, PurgeSummary, ScopeSummary};
