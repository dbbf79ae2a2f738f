//! Consistency repair for Dossier record stores.
//!
//! Stores written before the atomic write path existed may hold duplicate
//! groups, duplicate or gapped version numbers, several active versions per
//! group, and counters that drifted from the data. [`Repairer`] fixes all of
//! these one (project, discipline) bucket at a time, each bucket as a single
//! atomic batch, then installs the uniqueness constraints. It is safe to
//! interrupt and to re-run.
//!
//! Blobs are never moved or deleted. [`BlobAuditor`] reports unreferenced,
//! missing, and corrupted blobs without changing anything.

pub mod audit;
pub mod error;
pub mod plan;
pub mod repair;

#[cfg(test)]
mod fixtures;

pub use audit::{BlobAuditReport, BlobAuditor, BlobFinding};
pub use error::{RepairError, RepairResult};
pub use plan::{plan_bucket, BucketPlan};
pub use repair::{RepairReport, Repairer};
