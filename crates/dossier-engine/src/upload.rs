use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use dossier_ledger::Version;
use dossier_types::{ContentDigest, Discipline, GroupId, ProcessingStatus, ProjectId, VersionId};

/// A client upload staged in a temp file.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub project_id: ProjectId,
    pub discipline: Discipline,
    /// Staged file on the same filesystem as the blob root.
    pub temp_path: PathBuf,
    pub original_name: String,
    pub actor: String,
    pub reason: Option<String>,
}

/// What the caller gets back from a successful upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub project_id: ProjectId,
    pub discipline: Discipline,
    pub group_id: GroupId,
    pub version_id: VersionId,
    pub version_number: u64,
    pub processing_status: ProcessingStatus,
    pub is_active: bool,
    pub digest: ContentDigest,
    pub size: u64,
}

impl From<&Version> for UploadReceipt {
    fn from(v: &Version) -> Self {
        Self {
            project_id: v.project_id,
            discipline: v.discipline.clone(),
            group_id: v.group_id,
            version_id: v.id,
            version_number: v.number,
            processing_status: v.processing_status,
            is_active: v.is_active,
            digest: v.file.digest,
            size: v.file.size,
        }
    }
}

/// Owns a staged upload file and deletes it on drop unless disarmed.
///
/// Disarm once the file has been moved into the blob tree.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
    armed: bool,
}

impl TempUpload {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed staged upload"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "could not remove staged upload"),
        }
    }
}
