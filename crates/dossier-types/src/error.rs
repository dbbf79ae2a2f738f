use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invalid discipline {tag:?}: {reason}")]
    InvalidDiscipline { tag: String, reason: String },

    #[error("illegal processing transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("unknown status: {0}")]
    UnknownStatus(String),
}
