//! The record set and the primitive operations over it.
//!
//! Every method here either validates fully and then mutates, or fails
//! without mutating. Callers wrap them in a single lock acquisition, which
//! is what makes each primitive atomic.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use dossier_types::{
    Discipline, GroupId, GroupStatus, ProjectId, ProjectStatus, Timestamp, VersionId,
};

use crate::constraints::{Constraint, ConstraintSet};
use crate::error::{LedgerError, LedgerResult};
use crate::ops::{
    ActivationCause, ActivationOutcome, ActivationRequest, ProcessingUpdate, RepairBatch,
};
use crate::records::{AuditEntry, Group, Project, Version};

/// Current snapshot file format.
const SNAPSHOT_FORMAT: u32 = 1;

/// In-memory record set.
#[derive(Clone, Debug, Default)]
pub struct StoreState {
    projects: BTreeMap<ProjectId, Project>,
    groups: BTreeMap<GroupId, Group>,
    versions: BTreeMap<VersionId, Version>,
    audit: Vec<AuditEntry>,
    constraints: ConstraintSet,
}

/// On-disk form of a [`StoreState`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub format: u32,
    #[serde(default)]
    pub constraints: ConstraintSet,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub versions: Vec<Version>,
    #[serde(default)]
    pub audit: Vec<AuditEntry>,
}

impl StoreState {
    pub fn with_constraints(constraints: ConstraintSet) -> Self {
        Self {
            constraints,
            ..Self::default()
        }
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            format: SNAPSHOT_FORMAT,
            constraints: self.constraints,
            projects: self.projects.values().cloned().collect(),
            groups: self.groups.values().cloned().collect(),
            versions: self.versions.values().cloned().collect(),
            audit: self.audit.clone(),
        }
    }

    /// Rebuild from a snapshot. Installed constraints are re-checked so a
    /// hand-edited file cannot smuggle in violating data.
    pub fn from_snapshot(snapshot: Snapshot) -> LedgerResult<Self> {
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(LedgerError::Serialization(format!(
                "unsupported snapshot format {}",
                snapshot.format
            )));
        }
        let state = Self {
            projects: snapshot.projects.into_iter().map(|p| (p.id, p)).collect(),
            groups: snapshot.groups.into_iter().map(|g| (g.id, g)).collect(),
            versions: snapshot.versions.into_iter().map(|v| (v.id, v)).collect(),
            audit: snapshot.audit,
            constraints: snapshot.constraints,
        };
        state.check_installed()?;
        Ok(state)
    }

    // ---- projects ----

    pub fn insert_project(&mut self, project: &Project) -> LedgerResult<()> {
        if self.projects.contains_key(&project.id) {
            return Err(LedgerError::already_exists("project", project.id));
        }
        self.projects.insert(project.id, project.clone());
        Ok(())
    }

    pub fn get_project(&self, id: &ProjectId) -> Option<Project> {
        self.projects.get(id).cloned()
    }

    pub fn list_projects(&self) -> Vec<Project> {
        self.projects.values().cloned().collect()
    }

    pub fn set_project_status(
        &mut self,
        id: &ProjectId,
        status: ProjectStatus,
        at: Timestamp,
    ) -> LedgerResult<Project> {
        let project = self
            .projects
            .get_mut(id)
            .ok_or_else(|| LedgerError::not_found("project", id))?;
        project.status = status;
        project.updated_at = at;
        Ok(project.clone())
    }

    // ---- groups ----

    fn oldest_group_id(&self, project_id: &ProjectId, discipline: &Discipline) -> Option<GroupId> {
        self.groups
            .values()
            .filter(|g| g.project_id == *project_id && g.discipline == *discipline)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .map(|g| g.id)
    }

    pub fn upsert_group(
        &mut self,
        project_id: &ProjectId,
        discipline: &Discipline,
        at: Timestamp,
    ) -> LedgerResult<Group> {
        if !self.projects.contains_key(project_id) {
            return Err(LedgerError::not_found("project", project_id));
        }
        if let Some(id) = self.oldest_group_id(project_id, discipline) {
            return self.touch_group(&id, at);
        }
        let group = Group::new(*project_id, discipline.clone(), at);
        self.groups.insert(group.id, group.clone());
        Ok(group)
    }

    pub fn insert_group(&mut self, group: &Group) -> LedgerResult<()> {
        if self.groups.contains_key(&group.id) {
            return Err(LedgerError::already_exists("group", group.id));
        }
        if !self.projects.contains_key(&group.project_id) {
            return Err(LedgerError::not_found("project", group.project_id));
        }
        if self.constraints.group_key {
            if let Some(existing) = self.oldest_group_id(&group.project_id, &group.discipline) {
                return Err(LedgerError::DuplicateKey {
                    constraint: Constraint::GroupKey,
                    detail: format!(
                        "({}, {}) already held by group {existing}",
                        group.project_id, group.discipline
                    ),
                });
            }
        }
        self.groups.insert(group.id, group.clone());
        Ok(())
    }

    pub fn touch_group(&mut self, id: &GroupId, at: Timestamp) -> LedgerResult<Group> {
        let group = self
            .groups
            .get_mut(id)
            .ok_or_else(|| LedgerError::not_found("group", id))?;
        if at > group.updated_at {
            group.updated_at = at;
        }
        Ok(group.clone())
    }

    pub fn get_group(&self, id: &GroupId) -> Option<Group> {
        self.groups.get(id).cloned()
    }

    pub fn find_group(&self, project_id: &ProjectId, discipline: &Discipline) -> Option<Group> {
        self.oldest_group_id(project_id, discipline)
            .and_then(|id| self.groups.get(&id).cloned())
    }

    pub fn list_groups(&self) -> Vec<Group> {
        let mut groups: Vec<Group> = self.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        groups
    }

    pub fn increment_version_counter(&mut self, id: &GroupId) -> LedgerResult<u64> {
        let group = self
            .groups
            .get_mut(id)
            .ok_or_else(|| LedgerError::not_found("group", id))?;
        group.current_version += 1;
        Ok(group.current_version)
    }

    pub fn release_version_counter(&mut self, id: &GroupId, number: u64) -> LedgerResult<bool> {
        let group = self
            .groups
            .get_mut(id)
            .ok_or_else(|| LedgerError::not_found("group", id))?;
        if group.current_version == number && number > 0 {
            group.current_version -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    // ---- versions ----

    pub fn insert_version(&mut self, version: &Version) -> LedgerResult<()> {
        if self.versions.contains_key(&version.id) {
            return Err(LedgerError::already_exists("version", version.id));
        }
        let group = self
            .groups
            .get(&version.group_id)
            .ok_or_else(|| LedgerError::not_found("group", version.group_id))?;
        if group.project_id != version.project_id || group.discipline != version.discipline {
            return Err(LedgerError::InvariantViolation(format!(
                "version {} does not match the project/discipline of group {}",
                version.id, group.id
            )));
        }
        if version.number == 0 || version.number > group.current_version {
            return Err(LedgerError::InvariantViolation(format!(
                "version number {} was never reserved on group {} (counter {})",
                version.number, group.id, group.current_version
            )));
        }

        let siblings = || self.versions.values().filter(|v| v.group_id == version.group_id);
        if self.constraints.version_number {
            if let Some(taken) = siblings().find(|v| v.number == version.number) {
                return Err(LedgerError::DuplicateKey {
                    constraint: Constraint::VersionNumber,
                    detail: format!(
                        "number {} on group {} already held by version {}",
                        version.number, version.group_id, taken.id
                    ),
                });
            }
        }
        if self.constraints.single_active && version.is_active {
            if let Some(active) = siblings().find(|v| v.is_active) {
                return Err(LedgerError::DuplicateKey {
                    constraint: Constraint::SingleActive,
                    detail: format!("group {} already has active version {}", version.group_id, active.id),
                });
            }
        }

        self.versions.insert(version.id, version.clone());
        Ok(())
    }

    pub fn get_version(&self, id: &VersionId) -> Option<Version> {
        self.versions.get(id).cloned()
    }

    pub fn versions_for_group(&self, id: &GroupId) -> Vec<Version> {
        let mut versions: Vec<Version> = self
            .versions
            .values()
            .filter(|v| v.group_id == *id)
            .cloned()
            .collect();
        versions.sort_by(|a, b| {
            a.number
                .cmp(&b.number)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        versions
    }

    pub fn versions_for_project(&self, id: &ProjectId) -> Vec<Version> {
        let mut versions: Vec<Version> = self
            .versions
            .values()
            .filter(|v| v.project_id == *id)
            .cloned()
            .collect();
        versions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        versions
    }

    pub fn list_versions(&self) -> Vec<Version> {
        self.versions.values().cloned().collect()
    }

    pub fn activate_version(&mut self, request: &ActivationRequest) -> LedgerResult<ActivationOutcome> {
        let target = self
            .versions
            .get(&request.version_id)
            .ok_or_else(|| LedgerError::not_found("version", request.version_id))?;
        if target.group_id != request.group_id {
            return Err(LedgerError::NotFound {
                kind: "version in group",
                id: format!("{} in {}", request.version_id, request.group_id),
            });
        }
        if !self.groups.contains_key(&request.group_id) {
            return Err(LedgerError::not_found("group", request.group_id));
        }
        let target_number = target.number;

        let mut active: Vec<(u64, VersionId)> = self
            .versions
            .values()
            .filter(|v| v.group_id == request.group_id && v.is_active)
            .map(|v| (v.number, v.id))
            .collect();
        active.sort();
        let primary = active.last().map(|(_, id)| *id);

        match request.cause {
            ActivationCause::Upload => {
                if let Some((number, id)) = active.last() {
                    if *number > target_number {
                        return Ok(ActivationOutcome::Superseded { by: *id });
                    }
                }
            }
            ActivationCause::Rollback { expected_active } => {
                if primary != expected_active {
                    return Err(LedgerError::ConflictingActivation {
                        group: request.group_id,
                        expected: expected_active,
                        actual: primary,
                    });
                }
            }
        }

        let outcome = if active.len() == 1 && primary == Some(request.version_id) {
            ActivationOutcome::AlreadyActive
        } else {
            for version in self
                .versions
                .values_mut()
                .filter(|v| v.group_id == request.group_id)
            {
                let should_be_active = version.id == request.version_id;
                if version.is_active != should_be_active {
                    version.is_active = should_be_active;
                    version.updated_at = request.at;
                }
            }
            ActivationOutcome::Activated {
                previous: primary.filter(|id| *id != request.version_id),
            }
        };

        if let Some(group) = self.groups.get_mut(&request.group_id) {
            group.status = GroupStatus::Active;
            if matches!(request.cause, ActivationCause::Upload) {
                group.current_version = group.current_version.max(target_number);
            }
            if request.at > group.updated_at {
                group.updated_at = request.at;
            }
        }

        Ok(outcome)
    }

    pub fn update_processing(&mut self, id: &VersionId, update: &ProcessingUpdate) -> LedgerResult<Version> {
        let version = self
            .versions
            .get_mut(id)
            .ok_or_else(|| LedgerError::not_found("version", id))?;
        version.processing_status = version.processing_status.transition(update.status)?;
        match update.status {
            dossier_types::ProcessingStatus::Done => {
                version.result = update.result.clone();
                version.failure_reason = None;
            }
            dossier_types::ProcessingStatus::Failed => {
                version.failure_reason = update.failure_reason.clone();
            }
            _ => {
                version.failure_reason = None;
            }
        }
        version.updated_at = update.at;
        Ok(version.clone())
    }

    // ---- audit ----

    pub fn append_audit(&mut self, entry: &AuditEntry) -> LedgerResult<()> {
        if self.audit.iter().any(|e| e.id == entry.id) {
            return Err(LedgerError::already_exists("audit entry", entry.id));
        }
        self.audit.push(entry.clone());
        Ok(())
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.clone()
    }

    // ---- maintenance ----

    pub fn constraints(&self) -> ConstraintSet {
        self.constraints
    }

    pub fn install_constraint(&mut self, constraint: Constraint) -> LedgerResult<bool> {
        if self.constraints.contains(constraint) {
            return Ok(false);
        }
        if let Some(detail) = self.first_violation(constraint) {
            return Err(LedgerError::InvariantViolation(format!(
                "cannot install {constraint}: {detail}"
            )));
        }
        Ok(self.constraints.insert(constraint))
    }

    pub fn apply_repair(&mut self, batch: &RepairBatch) -> LedgerResult<()> {
        let mut next = self.clone();

        for change in &batch.version_changes {
            let group = next
                .groups
                .get(&change.group_id)
                .ok_or_else(|| LedgerError::not_found("group", change.group_id))?;
            let (project_id, discipline) = (group.project_id, group.discipline.clone());
            let version = next
                .versions
                .get_mut(&change.version_id)
                .ok_or_else(|| LedgerError::not_found("version", change.version_id))?;
            if version.project_id != project_id || version.discipline != discipline {
                return Err(LedgerError::InvariantViolation(format!(
                    "cannot move version {} into group {} of another project/discipline",
                    change.version_id, change.group_id
                )));
            }
            version.group_id = change.group_id;
            version.number = change.number;
            version.is_active = change.is_active;
        }

        for (group_id, counter) in &batch.counters {
            let group = next
                .groups
                .get_mut(group_id)
                .ok_or_else(|| LedgerError::not_found("group", group_id))?;
            group.current_version = *counter;
        }

        for group_id in &batch.delete_groups {
            if let Some(orphan) = next.versions.values().find(|v| v.group_id == *group_id) {
                return Err(LedgerError::InvariantViolation(format!(
                    "group {group_id} still owns version {}",
                    orphan.id
                )));
            }
            next.groups.remove(group_id);
        }

        let active_groups: Vec<GroupId> = next
            .versions
            .values()
            .filter(|v| v.is_active)
            .map(|v| v.group_id)
            .collect();
        for group_id in active_groups {
            if let Some(group) = next.groups.get_mut(&group_id) {
                group.status = GroupStatus::Active;
            }
        }

        next.check_installed()?;
        *self = next;
        Ok(())
    }

    fn check_installed(&self) -> LedgerResult<()> {
        for constraint in Constraint::ALL {
            if !self.constraints.contains(constraint) {
                continue;
            }
            if let Some(detail) = self.first_violation(constraint) {
                return Err(LedgerError::DuplicateKey { constraint, detail });
            }
        }
        Ok(())
    }

    /// Describe the first row set violating `constraint`, if any.
    fn first_violation(&self, constraint: Constraint) -> Option<String> {
        match constraint {
            Constraint::GroupKey => {
                let mut seen: HashMap<(ProjectId, &Discipline), GroupId> = HashMap::new();
                for group in self.groups.values() {
                    if let Some(other) = seen.insert(group.key(), group.id) {
                        return Some(format!(
                            "groups {other} and {} share ({}, {})",
                            group.id, group.project_id, group.discipline
                        ));
                    }
                }
                None
            }
            Constraint::VersionNumber => {
                let mut seen: HashMap<(GroupId, u64), VersionId> = HashMap::new();
                for version in self.versions.values() {
                    if let Some(other) = seen.insert((version.group_id, version.number), version.id) {
                        return Some(format!(
                            "versions {other} and {} share number {} on group {}",
                            version.id, version.number, version.group_id
                        ));
                    }
                }
                None
            }
            Constraint::SingleActive => {
                let mut seen: HashMap<GroupId, VersionId> = HashMap::new();
                for version in self.versions.values().filter(|v| v.is_active) {
                    if let Some(other) = seen.insert(version.group_id, version.id) {
                        return Some(format!(
                            "versions {other} and {} are both active on group {}",
                            version.id, version.group_id
                        ));
                    }
                }
                None
            }
        }
    }
}
