use std::sync::Arc;

use dossier_types::{Discipline, GroupId, ProjectId, Timestamp};

use crate::constraints::Constraint;
use crate::error::{LedgerError, LedgerResult};
use crate::records::Group;
use crate::traits::RecordStore;

/// Maps (project, discipline) to exactly one document group.
///
/// Creation is delegated to the store's insert-if-absent primitive, so two
/// concurrent first uploads for the same key always land in the same group.
#[derive(Clone)]
pub struct GroupDirectory {
    store: Arc<dyn RecordStore>,
}

impl GroupDirectory {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Return the group for `(project_id, discipline)`, creating it if
    /// absent, and refresh its `updated_at`.
    ///
    /// A store that reports a group-key collision (another writer created
    /// the key between our check and insert) is answered by re-reading the
    /// winner instead of failing the upload.
    pub fn resolve_or_create(
        &self,
        project_id: &ProjectId,
        discipline: &Discipline,
        at: Timestamp,
    ) -> LedgerResult<Group> {
        match self.store.upsert_group(project_id, discipline, at) {
            Ok(group) => Ok(group),
            Err(LedgerError::DuplicateKey {
                constraint: Constraint::GroupKey,
                detail,
            }) => {
                tracing::debug!(%project_id, %discipline, %detail, "group created concurrently, re-reading");
                let winner = self.store.find_group(project_id, discipline)?.ok_or_else(|| {
                    LedgerError::InvariantViolation(format!(
                        "group key ({project_id}, {discipline}) collided but no group exists"
                    ))
                })?;
                self.store.touch_group(&winner.id, at)
            }
            Err(e) => Err(e),
        }
    }

    /// The group for a key, if one exists (oldest, when legacy duplicates do).
    pub fn lookup(&self, project_id: &ProjectId, discipline: &Discipline) -> LedgerResult<Option<Group>> {
        self.store.find_group(project_id, discipline)
    }

    pub fn get(&self, group_id: &GroupId) -> LedgerResult<Group> {
        self.store
            .get_group(group_id)?
            .ok_or_else(|| LedgerError::not_found("group", group_id))
    }

    pub fn groups_for_project(&self, project_id: &ProjectId) -> LedgerResult<Vec<Group>> {
        Ok(self
            .store
            .list_groups()?
            .into_iter()
            .filter(|g| g.project_id == *project_id)
            .collect())
    }
}
