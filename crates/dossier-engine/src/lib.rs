//! Versioning engine for Dossier.
//!
//! [`VersioningEngine`] drives the write workflow: lock check, intake,
//! group resolution, number reservation, blob commit, version record,
//! activation, audit, and the downstream [`ValidationHook`]. Read paths
//! (listings, single versions, audit trails) are exposed alongside.

pub mod config;
pub mod engine;
pub mod error;
pub mod hook;
pub mod upload;

pub use config::{EngineConfig, ValidationMode};
pub use engine::VersioningEngine;
pub use error::{EngineError, EngineResult};
pub use hook::{AcceptAllHook, DigestCheckHook, ValidationHook};
pub use upload::{TempUpload, UploadReceipt, UploadRequest};
