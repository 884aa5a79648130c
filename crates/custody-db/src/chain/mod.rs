//! The hash chain: encoding, per-chain write leases, the append path, and
//! verification.

pub mod codec;
pub mod lease;
pub mod verifier;
pub mod writer;

pub use lease::{LeaseRegistry, TenantLease};
pub use verifier::{BreakKind, ChainBreak, ChainReport, ChainWalker};
