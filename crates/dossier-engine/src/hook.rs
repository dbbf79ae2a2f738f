use std::sync::Arc;

use async_trait::async_trait;

use dossier_ledger::Version;
use dossier_store::BlobStore;
use dossier_types::{ReviewDecision, ReviewOutcome};

use crate::error::{EngineError, EngineResult};

/// Downstream processing of a committed version (compliance review,
/// drawing checks, ...).
///
/// An `Ok` outcome marks the version `done` with the outcome as its result;
/// an `Err` marks it `failed` with the error text. Neither undoes the upload.
#[async_trait]
pub trait ValidationHook: Send + Sync {
    async fn review(&self, version: &Version) -> EngineResult<ReviewOutcome>;
}

/// Approves everything.
pub struct AcceptAllHook;

#[async_trait]
impl ValidationHook for AcceptAllHook {
    async fn review(&self, _version: &Version) -> EngineResult<ReviewOutcome> {
        Ok(ReviewOutcome::new(ReviewDecision::Approved))
    }
}

/// Re-reads the committed blob and approves it if the digest still matches
/// the version record.
pub struct DigestCheckHook {
    blobs: Arc<dyn BlobStore>,
}

impl DigestCheckHook {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }
}

#[async_trait]
impl ValidationHook for DigestCheckHook {
    async fn review(&self, version: &Version) -> EngineResult<ReviewOutcome> {
        let blobs = self.blobs.clone();
        let path = version.file.stored_path.clone();
        let digest = version.file.digest;
        tokio::task::spawn_blocking(move || blobs.verify(&path, &digest))
            .await
            .map_err(|e| EngineError::Internal(format!("digest check panicked: {e}")))??;
        Ok(ReviewOutcome::new(ReviewDecision::Approved).with_details(serde_json::json!({
            "digest": digest.to_hex(),
            "size": version.file.size,
        })))
    }
}
