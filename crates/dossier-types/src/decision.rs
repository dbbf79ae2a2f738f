use serde::{Deserialize, Serialize};

/// Decision returned by the downstream validation collaborator.
///
/// Loosely-typed "string or object" decisions are rejected at the
/// deserialization boundary: every payload must carry a `decision` tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected { reasons: Vec<String> },
    ApprovedWithConditions { conditions: Vec<String> },
}

impl ReviewDecision {
    /// `Approved` or `ApprovedWithConditions`.
    pub fn is_approved(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Result payload attached to a version once validation completes.
///
/// `details` is opaque to the core (rule findings, extracted fields, report
/// references) and stored as-is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    #[serde(flatten)]
    pub decision: ReviewDecision,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl ReviewOutcome {
    pub fn new(decision: ReviewDecision) -> Self {
        Self {
            decision,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}
