use std::sync::Arc;

use dossier_types::{GroupId, ProjectId, Timestamp, VersionId};

use crate::error::{LedgerError, LedgerResult};
use crate::ops::{ActivationCause, ActivationOutcome, ActivationRequest, ProcessingUpdate};
use crate::records::{AuditEntry, Version};
use crate::traits::RecordStore;

/// Version numbering, activation, and processing state for document groups.
///
/// Numbers are reserved before a blob is written and released again if the
/// write fails, so a failed upload never consumes a number unless a later
/// reservation has already been handed out.
#[derive(Clone)]
pub struct VersionLedger {
    store: Arc<dyn RecordStore>,
}

impl VersionLedger {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Atomically reserve the next version number of a group.
    pub fn reserve_next_version(&self, group_id: &GroupId) -> LedgerResult<u64> {
        let number = self.store.increment_version_counter(group_id)?;
        tracing::debug!(%group_id, number, "reserved version number");
        Ok(number)
    }

    /// Give back a reservation whose upload failed. A no-op if a later
    /// number has been reserved since.
    pub fn release_version(&self, group_id: &GroupId, number: u64) -> LedgerResult<bool> {
        let released = self.store.release_version_counter(group_id, number)?;
        if !released {
            tracing::warn!(%group_id, number, "reservation not released, number left as a gap");
        }
        Ok(released)
    }

    /// Persist a version under a number previously reserved for its group.
    pub fn record_version(&self, version: &Version) -> LedgerResult<()> {
        self.store.insert_version(version)
    }

    /// Make `version_id` the group's only active version, subject to `cause`.
    pub fn set_active_version(
        &self,
        group_id: &GroupId,
        version_id: &VersionId,
        cause: ActivationCause,
        at: Timestamp,
    ) -> LedgerResult<ActivationOutcome> {
        let outcome = self.store.activate_version(&ActivationRequest {
            group_id: *group_id,
            version_id: *version_id,
            cause,
            at,
        })?;
        tracing::info!(%group_id, %version_id, ?outcome, "activation");
        Ok(outcome)
    }

    /// Explicit activation (rollback or roll-forward) guarded against a
    /// concurrent change of the active version.
    pub fn activate(
        &self,
        group_id: &GroupId,
        version_id: &VersionId,
        at: Timestamp,
    ) -> LedgerResult<ActivationOutcome> {
        let expected_active = self.active_version(group_id)?.map(|v| v.id);
        self.set_active_version(
            group_id,
            version_id,
            ActivationCause::Rollback { expected_active },
            at,
        )
    }

    pub fn get_version(&self, version_id: &VersionId) -> LedgerResult<Version> {
        self.store
            .get_version(version_id)?
            .ok_or_else(|| LedgerError::not_found("version", version_id))
    }

    /// Versions of a group, newest number first.
    pub fn list_group_versions(&self, group_id: &GroupId) -> LedgerResult<Vec<Version>> {
        let mut versions = self.store.versions_for_group(group_id)?;
        versions.reverse();
        Ok(versions)
    }

    /// Versions of every group in a project, newest upload first.
    pub fn list_project_versions(&self, project_id: &ProjectId) -> LedgerResult<Vec<Version>> {
        let mut versions = self.store.versions_for_project(project_id)?;
        versions.reverse();
        Ok(versions)
    }

    /// The group's active version. On a legacy store holding several, the
    /// highest-numbered one.
    pub fn active_version(&self, group_id: &GroupId) -> LedgerResult<Option<Version>> {
        Ok(self
            .store
            .versions_for_group(group_id)?
            .into_iter()
            .filter(|v| v.is_active)
            .last())
    }

    /// Highest-numbered version whose processing completed.
    pub fn latest_completed(&self, group_id: &GroupId) -> LedgerResult<Option<Version>> {
        Ok(self
            .store
            .versions_for_group(group_id)?
            .into_iter()
            .filter(|v| v.processing_status == dossier_types::ProcessingStatus::Done)
            .last())
    }

    /// Versions still queued or processing whose last update is older than
    /// `cutoff`, oldest first.
    pub fn stuck_versions(&self, cutoff: Timestamp) -> LedgerResult<Vec<Version>> {
        let mut stuck: Vec<Version> = self
            .store
            .list_versions()?
            .into_iter()
            .filter(|v| v.processing_status.is_pending() && v.updated_at < cutoff)
            .collect();
        stuck.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));
        Ok(stuck)
    }

    /// Apply a processing-status transition.
    pub fn transition(&self, version_id: &VersionId, update: &ProcessingUpdate) -> LedgerResult<Version> {
        let version = self.store.update_processing(version_id, update)?;
        tracing::debug!(%version_id, status = %version.processing_status, "processing status updated");
        Ok(version)
    }

    pub fn audit(&self, entry: &AuditEntry) -> LedgerResult<()> {
        self.store.append_audit(entry)
    }

    /// Audit entries touching one version, in append order.
    pub fn audit_trail(&self, version_id: &VersionId) -> LedgerResult<Vec<AuditEntry>> {
        Ok(self
            .store
            .audit_entries()?
            .into_iter()
            .filter(|e| e.version_id == *version_id)
            .collect())
    }
}
