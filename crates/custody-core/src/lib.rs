//! # custody-core
//!
//! Core types, ID generation, and error types for the custody audit trail.
//!
//! This crate provides the foundational types shared across all custody crates:
//! - Entity structs for the persisted records (audit entries, legal holds,
//!   purge runs, purge links)
//! - Classification enums (audit scope, action kind, sensitivity, run status)
//! - ID prefix constants and generation helpers
//! - Cross-cutting error types

pub mod entities;
pub mod enums;
pub mod errors;
pub mod ids;
