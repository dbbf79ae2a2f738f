use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use dossier_ledger::RecordStore;
use dossier_store::{BlobError, BlobStore};
use dossier_types::VersionId;

use crate::error::RepairResult;

/// A discrepancy between the blob tree and the version records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlobFinding {
    /// A file in the blob tree that no version references.
    Unreferenced { path: PathBuf },
    /// A version whose blob is gone.
    Missing { version_id: VersionId, path: PathBuf },
    /// A version whose blob no longer hashes to the recorded digest.
    Corrupt {
        version_id: VersionId,
        path: PathBuf,
        detail: String,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BlobAuditReport {
    pub blobs_scanned: usize,
    pub versions_checked: usize,
    pub findings: Vec<BlobFinding>,
}

impl BlobAuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Cross-checks the blob tree against version records. Read-only.
pub struct BlobAuditor {
    store: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
}

impl BlobAuditor {
    pub fn new(store: Arc<dyn RecordStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { store, blobs }
    }

    pub fn audit(&self) -> RepairResult<BlobAuditReport> {
        let files = self.blobs.list()?;
        let versions = self.store.list_versions()?;
        let mut report = BlobAuditReport {
            blobs_scanned: files.len(),
            versions_checked: versions.len(),
            findings: Vec::new(),
        };

        let mut referenced = BTreeSet::new();
        for version in &versions {
            let path = version.file.stored_path.clone();
            referenced.insert(path.clone());
            match self.blobs.verify(&path, &version.file.digest) {
                Ok(()) => {}
                Err(BlobError::NotFound(_)) => {
                    warn!(version_id = %version.id, path = %path.display(), "blob missing");
                    report.findings.push(BlobFinding::Missing {
                        version_id: version.id,
                        path,
                    });
                }
                Err(e @ BlobError::DigestMismatch { .. }) => {
                    warn!(version_id = %version.id, path = %path.display(), "blob digest mismatch");
                    report.findings.push(BlobFinding::Corrupt {
                        version_id: version.id,
                        path,
                        detail: e.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        for path in files {
            if !referenced.contains(&path) {
                report.findings.push(BlobFinding::Unreferenced { path });
            }
        }

        info!(
            blobs = report.blobs_scanned,
            versions = report.versions_checked,
            findings = report.findings.len(),
            "blob audit finished"
        );
        Ok(report)
    }
}
