use std::fmt;

use serde::{Deserialize, Serialize};

/// Uniqueness constraints the record store can enforce.
///
/// Stores written by an older, unsafe write path may hold data that violates
/// these; the repair tool installs them once the data is consistent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// Unique (project, discipline) on groups.
    GroupKey,
    /// Unique (group, number) on versions.
    VersionNumber,
    /// Unique active version per group (partial: `is_active = true`).
    SingleActive,
}

impl Constraint {
    /// Installation order used by the repair tool.
    pub const ALL: [Constraint; 3] = [Self::GroupKey, Self::VersionNumber, Self::SingleActive];

    pub fn name(&self) -> &'static str {
        match self {
            Self::GroupKey => "groups_project_discipline_key",
            Self::VersionNumber => "versions_group_number_key",
            Self::SingleActive => "versions_single_active_idx",
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The set of constraints currently installed on a store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSet {
    #[serde(default)]
    pub group_key: bool,
    #[serde(default)]
    pub version_number: bool,
    #[serde(default)]
    pub single_active: bool,
}

impl ConstraintSet {
    /// Every constraint installed (a fresh, safe store).
    pub fn all() -> Self {
        Self {
            group_key: true,
            version_number: true,
            single_active: true,
        }
    }

    /// Nothing installed (a legacy store awaiting repair).
    pub fn none() -> Self {
        Self::default()
    }

    pub fn contains(&self, constraint: Constraint) -> bool {
        match constraint {
            Constraint::GroupKey => self.group_key,
            Constraint::VersionNumber => self.version_number,
            Constraint::SingleActive => self.single_active,
        }
    }

    /// Returns `true` if the constraint was newly added.
    pub fn insert(&mut self, constraint: Constraint) -> bool {
        let slot = match constraint {
            Constraint::GroupKey => &mut self.group_key,
            Constraint::VersionNumber => &mut self.version_number,
            Constraint::SingleActive => &mut self.single_active,
        };
        let added = !*slot;
        *slot = true;
        added
    }

    pub fn is_complete(&self) -> bool {
        Constraint::ALL.iter().all(|c| self.contains(*c))
    }
}
