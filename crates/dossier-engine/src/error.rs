use dossier_gate::GateError;
use dossier_ledger::LedgerError;
use dossier_store::BlobError;
use dossier_types::ProjectId;

/// Errors surfaced by the versioning engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The upload failed intake. Nothing was written.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("project {0} is locked")]
    LockedProject(ProjectId),

    /// The active version changed while an explicit activation was in
    /// flight. Retryable.
    #[error("conflicting activation: {0}")]
    ConflictingActivation(String),

    /// The blob could not be committed. Retryable.
    #[error("storage failure: {0}")]
    StorageFailure(#[source] BlobError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("ledger error: {0}")]
    Ledger(LedgerError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Returns `true` if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConflictingActivation(_) | Self::StorageFailure(_))
    }
}

impl From<LedgerError> for EngineError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound { .. } => Self::NotFound(e.to_string()),
            LedgerError::ConflictingActivation { .. } => Self::ConflictingActivation(e.to_string()),
            other => Self::Ledger(other),
        }
    }
}

impl From<GateError> for EngineError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::LockedProject(id) => Self::LockedProject(id),
            GateError::NotFound(id) => Self::NotFound(format!("project {id}")),
            GateError::Ledger(inner) => inner.into(),
        }
    }
}

impl From<BlobError> for EngineError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::InvalidFormat(msg) => Self::InvalidFormat(msg),
            other => Self::StorageFailure(other),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
