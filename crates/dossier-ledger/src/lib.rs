//! Record store and version ledger for Dossier.
//!
//! This crate owns every mutable record in the system and the primitives
//! that keep them consistent under concurrent writers:
//! - Record types: [`Project`], [`Group`], [`Version`], [`AuditEntry`]
//! - The [`RecordStore`] trait boundary with atomic primitives
//!   (insert-if-absent group upsert, increment-and-read counters,
//!   compare-and-activate, deferred-constraint repair batches)
//! - [`LocalRecordStore`], an in-process store with optional JSON snapshots
//! - [`GroupDirectory`] -- resolves (project, discipline) to exactly one group
//! - [`VersionLedger`] -- reserves version numbers and flips the active version
//! - [`InvariantValidator`] -- read-only diagnostics of the group/version invariants
//!
//! Serialization of `current_version` and `is_active` happens here, at the
//! data layer, never in callers.

pub mod constraints;
pub mod directory;
pub mod error;
pub mod memory;
pub mod ops;
pub mod records;
pub mod state;
pub mod traits;
pub mod validation;
pub mod versions;

#[cfg(test)]
mod test_support;

pub use constraints::{Constraint, ConstraintSet};
pub use directory::GroupDirectory;
pub use error::{LedgerError, LedgerResult};
pub use memory::LocalRecordStore;
pub use ops::{
    ActivationCause, ActivationOutcome, ActivationRequest, ProcessingUpdate, RepairBatch,
    VersionChange,
};
pub use records::{AuditAction, AuditEntry, FileMeta, Group, Project, Version};
pub use traits::RecordStore;
pub use validation::{InvariantValidator, ValidationReport, Violation, ViolationKind};
pub use versions::VersionLedger;
