//! Artifact blob storage for Dossier.
//!
//! Every uploaded version owns exactly one binary artifact, stored at a
//! deterministic path derived from project, discipline, and version number:
//!
//! ```text
//! <root>/<project-id>/<discipline>/v<number>/<stem>_<millis>.<ext>
//! ```
//!
//! # Modules
//!
//! - [`format`] -- intake checks: accepted extensions and file signatures
//! - [`layout`] -- path derivation and stored-name sanitizing
//! - [`digest`] -- streaming BLAKE3 digests of committed files
//! - [`traits`] -- the [`BlobStore`] interface used by the versioning engine
//! - [`fs`] -- [`FsBlobStore`], the filesystem backend
//!
//! # Design Rules
//!
//! 1. A blob is published by *moving* the inbound temp file into place.
//!    Before the move the bytes are not durable; after it the path and digest
//!    are fixed for the version's lifetime.
//! 2. Committed files are never overwritten, moved, or deleted.
//! 3. The digest lives in the version record, never in a sidecar file.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod digest;
pub mod error;
pub mod format;
pub mod fs;
pub mod layout;
pub mod traits;

pub use digest::digest_file;
pub use error::{BlobError, BlobResult};
pub use format::{ArtifactFormat, IntakePolicy};
pub use fs::FsBlobStore;
pub use layout::{sanitize_stem, BlobLayout, BlobTarget};
pub use traits::{BlobStore, CommittedBlob};
