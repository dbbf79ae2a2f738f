use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use dossier_types::{
    AuditId, ContentDigest, Discipline, GroupId, GroupStatus, ProcessingStatus, ProjectId,
    ProjectStatus, ReviewOutcome, Timestamp, VersionId,
};

/// A submission case.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub owner: String,
    pub status: ProjectStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Project {
    pub fn new(owner: impl Into<String>, at: Timestamp) -> Self {
        Self {
            id: ProjectId::new(),
            owner: owner.into(),
            status: ProjectStatus::Open,
            created_at: at,
            updated_at: at,
        }
    }
}

/// All versions of one discipline's documents within one project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub project_id: ProjectId,
    pub discipline: Discipline,
    /// Highest version number reserved so far. Mutated only by the store's
    /// atomic primitives.
    pub current_version: u64,
    pub status: GroupStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Group {
    /// A fresh group with the insert-only defaults.
    pub fn new(project_id: ProjectId, discipline: Discipline, at: Timestamp) -> Self {
        Self {
            id: GroupId::new(),
            project_id,
            discipline,
            current_version: 0,
            status: GroupStatus::Draft,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn key(&self) -> (ProjectId, &Discipline) {
        (self.project_id, &self.discipline)
    }
}

/// File metadata fixed at commit time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub original_name: String,
    pub stored_name: String,
    pub stored_path: PathBuf,
    pub size: u64,
    pub mime_type: String,
    pub digest: ContentDigest,
}

/// One immutable uploaded artifact plus its processing outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub group_id: GroupId,
    pub project_id: ProjectId,
    pub discipline: Discipline,
    pub number: u64,
    pub file: FileMeta,
    pub uploaded_by: String,
    pub upload_reason: Option<String>,
    pub is_active: bool,
    pub processing_status: ProcessingStatus,
    #[serde(default)]
    pub result: Option<ReviewOutcome>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// State-changing actions recorded in the audit trail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    UploadVersion,
    ActivateVersion,
    RevalidateVersion,
    FailVersion,
}

/// Append-only record of a state-changing action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditId,
    pub action: AuditAction,
    pub actor: String,
    pub project_id: ProjectId,
    pub group_id: GroupId,
    pub version_id: VersionId,
    pub version_number: u64,
    pub at: Timestamp,
}

impl AuditEntry {
    pub fn new(action: AuditAction, actor: impl Into<String>, version: &Version, at: Timestamp) -> Self {
        Self {
            id: AuditId::new(),
            action,
            actor: actor.into(),
            project_id: version.project_id,
            group_id: version.group_id,
            version_id: version.id,
            version_number: version.number,
            at,
        }
    }
}
