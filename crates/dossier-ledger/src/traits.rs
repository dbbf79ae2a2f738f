use dossier_types::{Discipline, GroupId, ProjectId, ProjectStatus, Timestamp, VersionId};

use crate::constraints::{Constraint, ConstraintSet};
use crate::error::LedgerResult;
use crate::ops::{ActivationOutcome, ActivationRequest, ProcessingUpdate, RepairBatch};
use crate::records::{AuditEntry, Group, Project, Version};

/// Backing store for every Dossier record.
///
/// Implementations must be thread-safe (`Send + Sync`) and make each method
/// one indivisible unit: no caller may observe a half-applied call. The
/// compound primitives (`upsert_group`, `increment_version_counter`,
/// `activate_version`, `apply_repair`) are the only way `current_version`
/// and `is_active` change.
pub trait RecordStore: Send + Sync {
    // ---- projects ----

    fn insert_project(&self, project: &Project) -> LedgerResult<()>;

    fn get_project(&self, id: &ProjectId) -> LedgerResult<Option<Project>>;

    fn list_projects(&self) -> LedgerResult<Vec<Project>>;

    /// Administrative status change. The versioning core never calls this.
    fn set_project_status(
        &self,
        id: &ProjectId,
        status: ProjectStatus,
        at: Timestamp,
    ) -> LedgerResult<Project>;

    // ---- groups ----

    /// Insert-if-absent keyed on (project, discipline), else return the
    /// existing group. Either way `updated_at` is set to `at`. When legacy
    /// duplicates exist the oldest is returned.
    fn upsert_group(
        &self,
        project_id: &ProjectId,
        discipline: &Discipline,
        at: Timestamp,
    ) -> LedgerResult<Group>;

    /// Raw insert. Fails with `DuplicateKey` when the group-key constraint is
    /// installed and the key is taken.
    fn insert_group(&self, group: &Group) -> LedgerResult<()>;

    fn touch_group(&self, id: &GroupId, at: Timestamp) -> LedgerResult<Group>;

    fn get_group(&self, id: &GroupId) -> LedgerResult<Option<Group>>;

    /// Oldest group with the given key.
    fn find_group(&self, project_id: &ProjectId, discipline: &Discipline)
        -> LedgerResult<Option<Group>>;

    fn list_groups(&self) -> LedgerResult<Vec<Group>>;

    /// Atomically increment the group's counter and return the new value.
    fn increment_version_counter(&self, id: &GroupId) -> LedgerResult<u64>;

    /// Decrement the counter only if it still equals `number`. Returns
    /// whether the reservation was given back.
    fn release_version_counter(&self, id: &GroupId, number: u64) -> LedgerResult<bool>;

    // ---- versions ----

    /// Insert a version whose number has been reserved on its group.
    fn insert_version(&self, version: &Version) -> LedgerResult<()>;

    fn get_version(&self, id: &VersionId) -> LedgerResult<Option<Version>>;

    /// Versions of a group, ascending by number.
    fn versions_for_group(&self, id: &GroupId) -> LedgerResult<Vec<Version>>;

    /// Versions of a project, across groups, ascending by creation time.
    fn versions_for_project(&self, id: &ProjectId) -> LedgerResult<Vec<Version>>;

    fn list_versions(&self) -> LedgerResult<Vec<Version>>;

    /// Compare-and-activate: deactivate every other version of the group and
    /// activate the target, subject to the request's cause.
    fn activate_version(&self, request: &ActivationRequest) -> LedgerResult<ActivationOutcome>;

    /// Apply a processing-status transition. File metadata is untouched.
    fn update_processing(&self, id: &VersionId, update: &ProcessingUpdate) -> LedgerResult<Version>;

    // ---- audit ----

    fn append_audit(&self, entry: &AuditEntry) -> LedgerResult<()>;

    fn audit_entries(&self) -> LedgerResult<Vec<AuditEntry>>;

    // ---- maintenance ----

    fn constraints(&self) -> LedgerResult<ConstraintSet>;

    /// Install a constraint. Fails with `InvariantViolation` if existing
    /// data violates it. Returns `true` if it was newly installed.
    fn install_constraint(&self, constraint: Constraint) -> LedgerResult<bool>;

    /// Apply one repair batch atomically with deferred constraint checks.
    fn apply_repair(&self, batch: &RepairBatch) -> LedgerResult<()>;
}
