use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use dossier_types::{Discipline, GroupId, ProjectId, ProjectStatus, Timestamp, VersionId};

use crate::constraints::{Constraint, ConstraintSet};
use crate::error::{LedgerError, LedgerResult};
use crate::ops::{ActivationOutcome, ActivationRequest, ProcessingUpdate, RepairBatch};
use crate::records::{AuditEntry, Group, Project, Version};
use crate::state::{Snapshot, StoreState};
use crate::traits::RecordStore;

/// In-process record store for tests, local deployments, and the CLI.
///
/// Every trait method runs under one lock acquisition. When opened with a
/// snapshot path, each successful mutation is written to disk (temp file
/// then rename) before it becomes visible; a failed write leaves both the
/// file and the in-memory state unchanged.
pub struct LocalRecordStore {
    path: Option<PathBuf>,
    inner: RwLock<StoreState>,
}

impl Default for LocalRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRecordStore {
    /// A fresh, memory-only store with every constraint installed.
    pub fn new() -> Self {
        Self::with_constraints(ConstraintSet::all())
    }

    /// A memory-only store with the given constraints installed. Use
    /// [`ConstraintSet::none`] to model a store written by the legacy path.
    pub fn with_constraints(constraints: ConstraintSet) -> Self {
        Self {
            path: None,
            inner: RwLock::new(StoreState::with_constraints(constraints)),
        }
    }

    /// Open a snapshot-backed store, creating the file (with every
    /// constraint installed) if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let raw = fs::read(&path)
                .map_err(|e| LedgerError::Persistence(format!("read {}: {e}", path.display())))?;
            let snapshot: Snapshot = serde_json::from_slice(&raw)
                .map_err(|e| LedgerError::Serialization(format!("{}: {e}", path.display())))?;
            StoreState::from_snapshot(snapshot)?
        } else {
            let state = StoreState::with_constraints(ConstraintSet::all());
            write_snapshot(&path, &state)?;
            state
        };
        tracing::debug!(path = %path.display(), "opened record store");
        Ok(Self {
            path: Some(path),
            inner: RwLock::new(state),
        })
    }

    /// Snapshot file backing this store, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> LedgerResult<T> {
        let guard = self.inner.read().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(f(&guard))
    }

    fn write<T>(&self, f: impl FnOnce(&mut StoreState) -> LedgerResult<T>) -> LedgerResult<T> {
        let mut guard = self.inner.write().map_err(|_| LedgerError::LockPoisoned)?;
        match &self.path {
            None => f(&mut guard),
            Some(path) => {
                let mut next = guard.clone();
                let out = f(&mut next)?;
                write_snapshot(path, &next)?;
                *guard = next;
                Ok(out)
            }
        }
    }
}

fn write_snapshot(path: &Path, state: &StoreState) -> LedgerResult<()> {
    let persist_err = |e: std::io::Error| LedgerError::Persistence(format!("{}: {e}", path.display()));
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(persist_err)?;

    let body = serde_json::to_vec_pretty(&state.to_snapshot())
        .map_err(|e| LedgerError::Serialization(e.to_string()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(persist_err)?;
    tmp.write_all(&body).map_err(persist_err)?;
    tmp.as_file().sync_all().map_err(persist_err)?;
    tmp.persist(path).map_err(|e| persist_err(e.error))?;
    Ok(())
}

impl RecordStore for LocalRecordStore {
    fn insert_project(&self, project: &Project) -> LedgerResult<()> {
        self.write(|s| s.insert_project(project))
    }

    fn get_project(&self, id: &ProjectId) -> LedgerResult<Option<Project>> {
        self.read(|s| s.get_project(id))
    }

    fn list_projects(&self) -> LedgerResult<Vec<Project>> {
        self.read(|s| s.list_projects())
    }

    fn set_project_status(
        &self,
        id: &ProjectId,
        status: ProjectStatus,
        at: Timestamp,
    ) -> LedgerResult<Project> {
        self.write(|s| s.set_project_status(id, status, at))
    }

    fn upsert_group(
        &self,
        project_id: &ProjectId,
        discipline: &Discipline,
        at: Timestamp,
    ) -> LedgerResult<Group> {
        self.write(|s| s.upsert_group(project_id, discipline, at))
    }

    fn insert_group(&self, group: &Group) -> LedgerResult<()> {
        self.write(|s| s.insert_group(group))
    }

    fn touch_group(&self, id: &GroupId, at: Timestamp) -> LedgerResult<Group> {
        self.write(|s| s.touch_group(id, at))
    }

    fn get_group(&self, id: &GroupId) -> LedgerResult<Option<Group>> {
        self.read(|s| s.get_group(id))
    }

    fn find_group(
        &self,
        project_id: &ProjectId,
        discipline: &Discipline,
    ) -> LedgerResult<Option<Group>> {
        self.read(|s| s.find_group(project_id, discipline))
    }

    fn list_groups(&self) -> LedgerResult<Vec<Group>> {
        self.read(|s| s.list_groups())
    }

    fn increment_version_counter(&self, id: &GroupId) -> LedgerResult<u64> {
        self.write(|s| s.increment_version_counter(id))
    }

    fn release_version_counter(&self, id: &GroupId, number: u64) -> LedgerResult<bool> {
        self.write(|s| s.release_version_counter(id, number))
    }

    fn insert_version(&self, version: &Version) -> LedgerResult<()> {
        self.write(|s| s.insert_version(version))
    }

    fn get_version(&self, id: &VersionId) -> LedgerResult<Option<Version>> {
        self.read(|s| s.get_version(id))
    }

    fn versions_for_group(&self, id: &GroupId) -> LedgerResult<Vec<Version>> {
        self.read(|s| s.versions_for_group(id))
    }

    fn versions_for_project(&self, id: &ProjectId) -> LedgerResult<Vec<Version>> {
        self.read(|s| s.versions_for_project(id))
    }

    fn list_versions(&self) -> LedgerResult<Vec<Version>> {
        self.read(|s| s.list_versions())
    }

    fn activate_version(&self, request: &ActivationRequest) -> LedgerResult<ActivationOutcome> {
        self.write(|s| s.activate_version(request))
    }

    fn update_processing(&self, id: &VersionId, update: &ProcessingUpdate) -> LedgerResult<Version> {
        self.write(|s| s.update_processing(id, update))
    }

    fn append_audit(&self, entry: &AuditEntry) -> LedgerResult<()> {
        self.write(|s| s.append_audit(entry))
    }

    fn audit_entries(&self) -> LedgerResult<Vec<AuditEntry>> {
        self.read(|s| s.audit_entries())
    }

    fn constraints(&self) -> LedgerResult<ConstraintSet> {
        self.read(|s| s.constraints())
    }

    fn install_constraint(&self, constraint: Constraint) -> LedgerResult<bool> {
        self.write(|s| s.install_constraint(constraint))
    }

    fn apply_repair(&self, batch: &RepairBatch) -> LedgerResult<()> {
        self.write(|s| s.apply_repair(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{ActivationCause, VersionChange};
    use crate::test_support::{committed, discipline, legacy_group, project, t, version};
    use dossier_types::{GroupStatus, ProcessingStatus, ReviewDecision, ReviewOutcome};

    fn activate(store: &LocalRecordStore, v: &Version, cause: ActivationCause) -> LedgerResult<ActivationOutcome> {
        store.activate_version(&ActivationRequest {
            group_id: v.group_id,
            version_id: v.id,
            cause,
            at: t(100),
        })
    }

    #[test]
    fn upsert_group_is_insert_if_absent() {
        let store = LocalRecordStore::new();
        let p = project(&store);
        let a = store.upsert_group(&p.id, &discipline("villa_plan"), t(1)).unwrap();
        let b = store.upsert_group(&p.id, &discipline("villa_plan"), t(2)).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.updated_at, t(2));
        assert_eq!(b.created_at, t(1));
        assert_eq!(store.list_groups().unwrap().len(), 1);
    }

    #[test]
    fn upsert_group_requires_project() {
        let store = LocalRecordStore::new();
        let err = store
            .upsert_group(&ProjectId::new(), &discipline("villa_plan"), t(1))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn group_key_constraint_rejects_raw_duplicate() {
        let store = LocalRecordStore::new();
        let p = project(&store);
        store.upsert_group(&p.id, &discipline("villa_plan"), t(1)).unwrap();
        let dup = Group::new(p.id, discipline("villa_plan"), t(2));
        let err = store.insert_group(&dup).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::DuplicateKey { constraint: Constraint::GroupKey, .. }
        ));
    }

    #[test]
    fn legacy_store_accepts_duplicates_and_finds_oldest() {
        let store = LocalRecordStore::with_constraints(ConstraintSet::none());
        let p = project(&store);
        let newer = legacy_group(&store, p.id, "villa_plan", t(5));
        let older = legacy_group(&store, p.id, "villa_plan", t(1));
        let found = store.find_group(&p.id, &discipline("villa_plan")).unwrap().unwrap();
        assert_eq!(found.id, older.id);
        assert_ne!(found.id, newer.id);
        let err = store.install_constraint(Constraint::GroupKey).unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation(_)));
    }

    #[test]
    fn version_number_must_be_reserved() {
        let store = LocalRecordStore::new();
        let p = project(&store);
        let g = store.upsert_group(&p.id, &discipline("villa_plan"), t(1)).unwrap();
        let err = store.insert_version(&version(&g, 1, t(2))).unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation(_)));

        let v1 = committed(&store, &g, t(3));
        assert_eq!(v1.number, 1);
        let mut dup = version(&g, 1, t(4));
        dup.id = VersionId::new();
        let err = store.insert_version(&dup).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::DuplicateKey { constraint: Constraint::VersionNumber, .. }
        ));
    }

    #[test]
    fn release_only_gives_back_the_top_reservation() {
        let store = LocalRecordStore::new();
        let p = project(&store);
        let g = store.upsert_group(&p.id, &discipline("villa_plan"), t(1)).unwrap();
        assert_eq!(store.increment_version_counter(&g.id).unwrap(), 1);
        assert_eq!(store.increment_version_counter(&g.id).unwrap(), 2);
        assert!(!store.release_version_counter(&g.id, 1).unwrap());
        assert!(store.release_version_counter(&g.id, 2).unwrap());
        assert_eq!(store.get_group(&g.id).unwrap().unwrap().current_version, 1);
    }

    #[test]
    fn upload_activation_is_newest_wins() {
        let store = LocalRecordStore::new();
        let p = project(&store);
        let g = store.upsert_group(&p.id, &discipline("villa_plan"), t(1)).unwrap();
        let v1 = committed(&store, &g, t(2));
        let v2 = committed(&store, &g, t(3));

        assert_eq!(
            activate(&store, &v2, ActivationCause::Upload).unwrap(),
            ActivationOutcome::Activated { previous: None }
        );
        assert_eq!(
            activate(&store, &v1, ActivationCause::Upload).unwrap(),
            ActivationOutcome::Superseded { by: v2.id }
        );
        assert!(!store.get_version(&v1.id).unwrap().unwrap().is_active);
        assert!(store.get_version(&v2.id).unwrap().unwrap().is_active);
        assert_eq!(
            store.get_group(&g.id).unwrap().unwrap().status,
            GroupStatus::Active
        );
    }

    #[test]
    fn rollback_is_compare_and_activate() {
        let store = LocalRecordStore::new();
        let p = project(&store);
        let g = store.upsert_group(&p.id, &discipline("villa_plan"), t(1)).unwrap();
        let v1 = committed(&store, &g, t(2));
        let v2 = committed(&store, &g, t(3));
        activate(&store, &v2, ActivationCause::Upload).unwrap();

        let stale = ActivationCause::Rollback { expected_active: Some(v1.id) };
        let err = activate(&store, &v1, stale).unwrap_err();
        assert!(matches!(err, LedgerError::ConflictingActivation { actual, .. } if actual == Some(v2.id)));

        let fresh = ActivationCause::Rollback { expected_active: Some(v2.id) };
        assert_eq!(
            activate(&store, &v1, fresh).unwrap(),
            ActivationOutcome::Activated { previous: Some(v2.id) }
        );
        let again = ActivationCause::Rollback { expected_active: Some(v1.id) };
        assert_eq!(activate(&store, &v1, again).unwrap(), ActivationOutcome::AlreadyActive);
    }

    #[test]
    fn activation_rejects_version_of_another_group() {
        let store = LocalRecordStore::new();
        let p = project(&store);
        let a = store.upsert_group(&p.id, &discipline("villa_plan"), t(1)).unwrap();
        let b = store.upsert_group(&p.id, &discipline("structural"), t(1)).unwrap();
        let v = committed(&store, &a, t(2));
        let err = store
            .activate_version(&ActivationRequest {
                group_id: b.id,
                version_id: v.id,
                cause: ActivationCause::Rollback { expected_active: None },
                at: t(3),
            })
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!store.get_version(&v.id).unwrap().unwrap().is_active);
    }

    #[test]
    fn processing_updates_follow_the_state_machine() {
        let store = LocalRecordStore::new();
        let p = project(&store);
        let g = store.upsert_group(&p.id, &discipline("villa_plan"), t(1)).unwrap();
        let v = committed(&store, &g, t(2));

        let err = store
            .update_processing(&v.id, &ProcessingUpdate::done(ReviewOutcome::new(ReviewDecision::Approved), t(3)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition(_)));

        store.update_processing(&v.id, &ProcessingUpdate::processing(t(3))).unwrap();
        let failed = store
            .update_processing(&v.id, &ProcessingUpdate::failed("validator timeout", t(4)))
            .unwrap();
        assert_eq!(failed.processing_status, ProcessingStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("validator timeout"));
        assert_eq!(failed.file, v.file);

        let retried = store.update_processing(&v.id, &ProcessingUpdate::processing(t(5))).unwrap();
        assert!(retried.failure_reason.is_none());
        let done = store
            .update_processing(&v.id, &ProcessingUpdate::done(ReviewOutcome::new(ReviewDecision::Approved), t(6)))
            .unwrap();
        assert!(done.result.is_some_and(|r| r.decision.is_approved()));
    }

    #[test]
    fn repair_batch_checks_constraints_after_all_changes() {
        let store = LocalRecordStore::new();
        let p = project(&store);
        let g = store.upsert_group(&p.id, &discipline("villa_plan"), t(1)).unwrap();
        let v1 = committed(&store, &g, t(2));
        let v2 = committed(&store, &g, t(3));

        // Swap numbers: each change alone collides with the other row.
        let swap = RepairBatch {
            version_changes: vec![
                VersionChange { version_id: v1.id, group_id: g.id, number: 2, is_active: false },
                VersionChange { version_id: v2.id, group_id: g.id, number: 1, is_active: true },
            ],
            counters: vec![(g.id, 2)],
            delete_groups: vec![],
        };
        store.apply_repair(&swap).unwrap();
        assert_eq!(store.get_version(&v1.id).unwrap().unwrap().number, 2);
        assert_eq!(store.get_version(&v2.id).unwrap().unwrap().number, 1);

        let collide = RepairBatch {
            version_changes: vec![VersionChange { version_id: v1.id, group_id: g.id, number: 1, is_active: false }],
            ..RepairBatch::default()
        };
        assert!(store.apply_repair(&collide).is_err());
        assert_eq!(store.get_version(&v1.id).unwrap().unwrap().number, 2);
    }

    #[test]
    fn repair_refuses_to_orphan_versions() {
        let store = LocalRecordStore::with_constraints(ConstraintSet::none());
        let p = project(&store);
        let g = legacy_group(&store, p.id, "villa_plan", t(1));
        committed(&store, &g, t(2));
        let err = store
            .apply_repair(&RepairBatch { delete_groups: vec![g.id], ..RepairBatch::default() })
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation(_)));
        assert!(store.get_group(&g.id).unwrap().is_some());
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let (project_id, version_id) = {
            let store = LocalRecordStore::open(&path).unwrap();
            let p = project(&store);
            let g = store.upsert_group(&p.id, &discipline("villa_plan"), t(1)).unwrap();
            let v = committed(&store, &g, t(2));
            activate(&store, &v, ActivationCause::Upload).unwrap();
            (p.id, v.id)
        };

        let reopened = LocalRecordStore::open(&path).unwrap();
        assert!(reopened.get_project(&project_id).unwrap().is_some());
        let v = reopened.get_version(&version_id).unwrap().unwrap();
        assert!(v.is_active);
        assert_eq!(v.number, 1);
        assert!(reopened.constraints().unwrap().is_complete());
    }

    #[test]
    fn failed_mutation_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let store = LocalRecordStore::open(&path).unwrap();
        let p = project(&store);
        let before = std::fs::read(&path).unwrap();
        let err = store.insert_project(&p).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExists { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }
}
