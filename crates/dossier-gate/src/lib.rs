//! Project lock gate.
//!
//! Every mutating path (uploads, explicit activations) passes through
//! [`ProjectLockGate::assert_writable`] before touching shared state. Reads
//! never do.

use std::sync::Arc;

use dossier_ledger::{LedgerError, Project, RecordStore};
use dossier_types::ProjectId;

/// Errors raised by the lock gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// The project is locked; no new versions or activations are accepted.
    #[error("project {0} is locked")]
    LockedProject(ProjectId),

    #[error("project not found: {0}")]
    NotFound(ProjectId),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result alias for gate checks.
pub type GateResult<T> = Result<T, GateError>;

/// Read-only admission check on a project's lock status.
#[derive(Clone)]
pub struct ProjectLockGate {
    store: Arc<dyn RecordStore>,
}

impl ProjectLockGate {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Succeed if the project exists and is open; return it for callers that
    /// need its metadata.
    pub fn assert_writable(&self, project_id: &ProjectId) -> GateResult<Project> {
        let project = self
            .store
            .get_project(project_id)?
            .ok_or(GateError::NotFound(*project_id))?;
        if project.status.is_locked() {
            tracing::info!(project = %project_id, "write refused: project locked");
            return Err(GateError::LockedProject(*project_id));
        }
        Ok(project)
    }
}
