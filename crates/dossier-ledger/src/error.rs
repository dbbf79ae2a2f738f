use dossier_types::{GroupId, TypeError, VersionId};

use crate::constraints::Constraint;

/// Errors produced by record store and ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    /// An insert or update would violate an installed uniqueness constraint.
    #[error("duplicate key violates {constraint}: {detail}")]
    DuplicateKey { constraint: Constraint, detail: String },

    /// The group's active version changed between read and activation.
    #[error("conflicting activation on group {group}: expected active {expected:?}, found {actual:?}")]
    ConflictingActivation {
        group: GroupId,
        expected: Option<VersionId>,
        actual: Option<VersionId>,
    },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("record store lock poisoned")]
    LockPoisoned,
}

impl LedgerError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn already_exists(kind: &'static str, id: impl ToString) -> Self {
        Self::AlreadyExists {
            kind,
            id: id.to_string(),
        }
    }

    /// Returns `true` for `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<TypeError> for LedgerError {
    fn from(e: TypeError) -> Self {
        match e {
            TypeError::IllegalTransition { .. } => Self::InvalidTransition(e.to_string()),
            other => Self::Serialization(other.to_string()),
        }
    }
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
