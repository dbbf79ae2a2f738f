use std::path::{Path, PathBuf};

use dossier_types::ContentDigest;

use crate::error::BlobResult;
use crate::format::ArtifactFormat;
use crate::layout::BlobTarget;

/// A blob published into the managed tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommittedBlob {
    pub final_path: PathBuf,
    pub stored_name: String,
    pub size: u64,
    pub digest: ContentDigest,
}

/// Immutable artifact storage.
///
/// All implementations must satisfy these invariants:
/// - `commit` moves the temp file; it never copies and never overwrites.
/// - A failed `commit` leaves nothing inside the managed tree. The temp
///   file stays where it was and remains the caller's to clean up.
/// - Committed blobs are read-only for the lifetime of their version.
/// - A target directory may already hold blobs of renumbered versions;
///   those are never touched.
pub trait BlobStore: Send + Sync {
    /// Publish `temp_path` as the artifact for `target`.
    fn commit(
        &self,
        temp_path: &Path,
        target: &BlobTarget,
        original_name: &str,
        format: ArtifactFormat,
    ) -> BlobResult<CommittedBlob>;

    /// Read a committed blob.
    fn read(&self, path: &Path) -> BlobResult<Vec<u8>>;

    /// Check whether a committed blob exists.
    fn exists(&self, path: &Path) -> BlobResult<bool>;

    /// Recompute the digest of a committed blob and compare.
    fn verify(&self, path: &Path, expected: &ContentDigest) -> BlobResult<()>;

    /// Every file currently inside the managed tree, sorted.
    fn list(&self) -> BlobResult<Vec<PathBuf>>;
}
