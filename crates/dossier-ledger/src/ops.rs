//! Payloads for the store's compound atomic operations.

use serde::{Deserialize, Serialize};

use dossier_types::{GroupId, ProcessingStatus, ReviewOutcome, Timestamp, VersionId};

/// Why a version is being activated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationCause {
    /// A fresh upload. Newest upload wins: a version with a higher number
    /// that is already active is never displaced. The group counter is raised
    /// to at least this version's number.
    Upload,
    /// An explicit activation (rollback or roll-forward). Fails with
    /// `ConflictingActivation` unless the group's active version is still
    /// `expected_active`.
    Rollback { expected_active: Option<VersionId> },
}

/// One compare-and-activate call.
#[derive(Clone, Debug)]
pub struct ActivationRequest {
    pub group_id: GroupId,
    pub version_id: VersionId,
    pub cause: ActivationCause,
    pub at: Timestamp,
}

/// What an activation did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// The target is now the only active version.
    Activated { previous: Option<VersionId> },
    /// The target was already the only active version.
    AlreadyActive,
    /// A newer upload is already active; the target stays inactive.
    Superseded { by: VersionId },
}

impl ActivationOutcome {
    /// Returns `true` if the target is active after the call.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Superseded { .. })
    }
}

/// A processing-status transition with its payload.
#[derive(Clone, Debug)]
pub struct ProcessingUpdate {
    pub status: ProcessingStatus,
    pub result: Option<ReviewOutcome>,
    pub failure_reason: Option<String>,
    pub at: Timestamp,
}

impl ProcessingUpdate {
    pub fn processing(at: Timestamp) -> Self {
        Self {
            status: ProcessingStatus::Processing,
            result: None,
            failure_reason: None,
            at,
        }
    }

    pub fn done(result: ReviewOutcome, at: Timestamp) -> Self {
        Self {
            status: ProcessingStatus::Done,
            result: Some(result),
            failure_reason: None,
            at,
        }
    }

    pub fn failed(reason: impl Into<String>, at: Timestamp) -> Self {
        Self {
            status: ProcessingStatus::Failed,
            result: None,
            failure_reason: Some(reason.into()),
            at,
        }
    }
}

/// New placement of one version inside a repair batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionChange {
    pub version_id: VersionId,
    pub group_id: GroupId,
    pub number: u64,
    pub is_active: bool,
}

/// Changes for one (project, discipline) bucket, applied as a single unit.
///
/// Installed constraints are checked once, after every change in the batch
/// has been applied (deferred), so intermediate states such as two versions
/// briefly sharing a number never fail the batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairBatch {
    pub version_changes: Vec<VersionChange>,
    pub counters: Vec<(GroupId, u64)>,
    pub delete_groups: Vec<GroupId>,
}

impl RepairBatch {
    pub fn is_empty(&self) -> bool {
        self.version_changes.is_empty() && self.counters.is_empty() && self.delete_groups.is_empty()
    }
}
