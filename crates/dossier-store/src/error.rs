use std::path::PathBuf;

use dossier_types::ContentDigest;

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// The inbound file failed intake checks. No state has been touched.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A file already occupies the target path.
    #[error("blob already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Publishing the temp file into the managed tree failed.
    #[error("cannot move {} to {}: {source}", from.display(), to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The requested blob does not exist.
    #[error("blob not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Content digest mismatch on verification (data corruption).
    #[error("digest mismatch for {}: expected {expected}, computed {computed}", path.display())]
    DigestMismatch {
        path: PathBuf,
        expected: ContentDigest,
        computed: ContentDigest,
    },

    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for blob operations.
pub type BlobResult<T> = Result<T, BlobError>;
