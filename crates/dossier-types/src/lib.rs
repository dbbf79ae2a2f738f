//! Foundation types for Dossier.
//!
//! Dossier tracks regulatory submission artifacts as an append-only,
//! versioned history per project and per document discipline. Every other
//! Dossier crate depends on `dossier-types`.
//!
//! # Key Types
//!
//! - [`ProjectId`], [`GroupId`], [`VersionId`], [`AuditId`]: UUID v7 record identifiers
//! - [`Discipline`]: validated document-type tag scoping a group within a project
//! - [`ProjectStatus`], [`GroupStatus`], [`ProcessingStatus`]: lifecycle states
//! - [`ContentDigest`]: BLAKE3 digest of a committed artifact
//! - [`ReviewDecision`]: typed outcome returned by downstream validation

pub mod decision;
pub mod digest;
pub mod discipline;
pub mod error;
pub mod ids;
pub mod status;

pub use decision::{ReviewDecision, ReviewOutcome};
pub use digest::ContentDigest;
pub use discipline::Discipline;
pub use error::TypeError;
pub use ids::{AuditId, GroupId, ProjectId, VersionId};
pub use status::{GroupStatus, ProcessingStatus, ProjectStatus};

/// UTC wall-clock timestamp used on every record.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
