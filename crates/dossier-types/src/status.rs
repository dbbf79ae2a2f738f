use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Lifecycle of a submission case.
///
/// `Locked` is set by an administrative decision; the core only reads it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Open,
    Locked,
}

impl ProjectStatus {
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked)
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Locked => f.write_str("locked"),
        }
    }
}

/// Lifecycle of a document group. A group leaves `Draft` when its first
/// version is activated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    #[default]
    Draft,
    Active,
}

/// Downstream processing state of a version.
///
/// ```text
/// queued ──► processing ──► done
///    │            │
///    └────────────┴───────► failed
/// ```
///
/// `done`, `failed` and a stuck `processing` may re-enter `processing` when
/// validation is re-run; the upload itself is never re-done.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Queued,
    Processing,
    Done,
    Failed,
}

impl ProcessingStatus {
    /// Returns `true` if `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Queued | Processing | Done | Failed, Processing)
                | (Processing, Done)
                | (Queued | Processing, Failed)
        )
    }

    /// Validate a transition, returning the new status.
    pub fn transition(&self, next: ProcessingStatus) -> Result<ProcessingStatus, TypeError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TypeError::IllegalTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// `done` or `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// `queued` or `processing`: candidates for stuck-version discovery.
    pub fn is_pending(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(TypeError::UnknownStatus(other.to_string())),
        }
    }
}
