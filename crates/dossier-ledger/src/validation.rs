use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use dossier_types::{Discipline, GroupId, ProjectId};

use crate::error::LedgerResult;
use crate::records::{Group, Version};
use crate::traits::RecordStore;

/// Result of an invariant check over a whole record store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub groups_checked: usize,
    pub versions_checked: usize,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Returns `true` if no invariant is violated.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn count(&self, kind: ViolationKind) -> usize {
        self.violations.iter().filter(|v| v.kind == kind).count()
    }
}

/// One broken invariant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub project_id: ProjectId,
    pub discipline: Discipline,
    pub group_id: Option<GroupId>,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// More than one group for a (project, discipline) key.
    DuplicateGroup,
    /// More than one active version in a group.
    MultipleActive,
    /// A group with versions but none active.
    NoActive,
    /// Version numbers are not exactly 1..=n.
    SequenceGap,
    /// Two versions of a group share a number.
    DuplicateNumber,
    /// The group counter differs from its version count.
    CounterDrift,
    /// A version pointing at a missing group, or at a group of another
    /// project or discipline.
    OrphanVersion,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DuplicateGroup => "duplicate group",
            Self::MultipleActive => "multiple active",
            Self::NoActive => "no active",
            Self::SequenceGap => "sequence gap",
            Self::DuplicateNumber => "duplicate number",
            Self::CounterDrift => "counter drift",
            Self::OrphanVersion => "orphan version",
        };
        f.write_str(s)
    }
}

/// Read-only checker for the group and version invariants.
pub struct InvariantValidator;

impl InvariantValidator {
    /// Check every group and version in the store.
    pub fn validate(store: &dyn RecordStore) -> LedgerResult<ValidationReport> {
        let groups = store.list_groups()?;
        let versions = store.list_versions()?;
        let mut report = ValidationReport {
            groups_checked: groups.len(),
            versions_checked: versions.len(),
            violations: Vec::new(),
        };

        let by_id: BTreeMap<GroupId, &Group> = groups.iter().map(|g| (g.id, g)).collect();
        let mut owned: BTreeMap<GroupId, Vec<&Version>> = BTreeMap::new();
        for version in &versions {
            match by_id.get(&version.group_id) {
                Some(g) if g.project_id == version.project_id && g.discipline == version.discipline => {
                    owned.entry(g.id).or_default().push(version);
                }
                _ => report.violations.push(Violation {
                    kind: ViolationKind::OrphanVersion,
                    project_id: version.project_id,
                    discipline: version.discipline.clone(),
                    group_id: Some(version.group_id),
                    description: format!(
                        "version {} (v{}) does not belong to a matching group",
                        version.id, version.number
                    ),
                }),
            }
        }

        let mut buckets: BTreeMap<(ProjectId, Discipline), Vec<&Group>> = BTreeMap::new();
        for group in &groups {
            buckets
                .entry((group.project_id, group.discipline.clone()))
                .or_default()
                .push(group);
        }

        for ((project_id, discipline), bucket) in &buckets {
            if bucket.len() > 1 {
                report.violations.push(Violation {
                    kind: ViolationKind::DuplicateGroup,
                    project_id: *project_id,
                    discipline: discipline.clone(),
                    group_id: None,
                    description: format!("{} groups share this key", bucket.len()),
                });
            }
            for group in bucket {
                let empty = Vec::new();
                let versions = owned.get(&group.id).unwrap_or(&empty);
                check_group(group, versions, &mut report.violations);
            }
        }

        Ok(report)
    }
}

fn check_group(group: &Group, versions: &[&Version], out: &mut Vec<Violation>) {
    let mut push = |kind, description: String| {
        out.push(Violation {
            kind,
            project_id: group.project_id,
            discipline: group.discipline.clone(),
            group_id: Some(group.id),
            description,
        })
    };

    let numbers: BTreeSet<u64> = versions.iter().map(|v| v.number).collect();
    if numbers.len() != versions.len() {
        push(
            ViolationKind::DuplicateNumber,
            format!("{} versions share {} numbers", versions.len(), numbers.len()),
        );
    }
    let dense = numbers.iter().copied().eq(1..=numbers.len() as u64);
    if !dense {
        push(
            ViolationKind::SequenceGap,
            format!("numbers {numbers:?} are not contiguous from 1"),
        );
    }

    let active = versions.iter().filter(|v| v.is_active).count();
    if active > 1 {
        push(ViolationKind::MultipleActive, format!("{active} active versions"));
    } else if active == 0 && !versions.is_empty() {
        push(ViolationKind::NoActive, format!("{} versions, none active", versions.len()));
    }

    if group.current_version != versions.len() as u64 {
        push(
            ViolationKind::CounterDrift,
            format!(
                "counter is {} but the group holds {} versions",
                group.current_version,
                versions.len()
            ),
        );
    }
}
