//! Pure repair planning for one (project, discipline) bucket.

use std::collections::BTreeSet;

use dossier_ledger::{Group, RepairBatch, Version, VersionChange};
use dossier_types::GroupId;

/// Changes needed to make one bucket consistent, with counts for reporting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BucketPlan {
    /// The group that survives (oldest by creation time, then id).
    pub master: Option<GroupId>,
    pub batch: RepairBatch,
    /// Duplicate groups folded into the master.
    pub merged_groups: usize,
    /// Groups whose numbers were rewritten without a merge.
    pub resequenced_groups: usize,
    pub deactivated: usize,
    pub activated: usize,
    pub counters_reset: usize,
}

impl BucketPlan {
    pub fn is_noop(&self) -> bool {
        self.batch.is_empty()
    }
}

/// Plan the repair of a bucket: every group sharing one (project,
/// discipline) key, and the versions they own.
///
/// With duplicates, every version moves to the master and is numbered
/// 1..=n in creation order (ties by old number, then id); the newest is the
/// only active one. Without duplicates, numbers are rewritten the same way
/// only if they are not already 1..=n; the active version is kept (the
/// highest numbered if several are active, the highest numbered version if
/// none is). A bucket that is already consistent yields an empty batch.
pub fn plan_bucket(groups: &[Group], versions: &[Version]) -> BucketPlan {
    let mut ordered: Vec<&Group> = groups.iter().collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    let Some(master) = ordered.first().copied() else {
        return BucketPlan::default();
    };
    let slaves = &ordered[1..];
    let members: BTreeSet<GroupId> = ordered.iter().map(|g| g.id).collect();

    let mut plan = BucketPlan {
        master: Some(master.id),
        ..BucketPlan::default()
    };

    // (version, new number, new active)
    let targets: Vec<(&Version, u64, bool)> = if slaves.is_empty() {
        let mut own: Vec<&Version> = versions.iter().filter(|v| v.group_id == master.id).collect();
        own.sort_by(|a, b| {
            a.number
                .cmp(&b.number)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        let dense = own.iter().map(|v| v.number).eq(1..=own.len() as u64);
        let numbered: Vec<(&Version, u64)> = if dense {
            own.into_iter().map(|v| (v, v.number)).collect()
        } else {
            plan.resequenced_groups = 1;
            in_creation_order(own)
        };
        let keep = numbered
            .iter()
            .filter(|(v, _)| v.is_active)
            .map(|(_, n)| *n)
            .max()
            .or_else(|| numbered.iter().map(|(_, n)| *n).max());
        numbered
            .into_iter()
            .map(|(v, n)| (v, n, Some(n) == keep))
            .collect()
    } else {
        plan.merged_groups = slaves.len();
        plan.batch.delete_groups = slaves.iter().map(|g| g.id).collect();
        let all: Vec<&Version> = versions.iter().filter(|v| members.contains(&v.group_id)).collect();
        let numbered = in_creation_order(all);
        let last = numbered.len() as u64;
        numbered
            .into_iter()
            .map(|(v, n)| (v, n, n == last))
            .collect()
    };

    let count = targets.len() as u64;
    for (version, number, active) in targets {
        match (version.is_active, active) {
            (true, false) => plan.deactivated += 1,
            (false, true) => plan.activated += 1,
            _ => {}
        }
        if version.group_id != master.id || version.number != number || version.is_active != active {
            plan.batch.version_changes.push(VersionChange {
                version_id: version.id,
                group_id: master.id,
                number,
                is_active: active,
            });
        }
    }

    if master.current_version != count {
        plan.counters_reset = 1;
        plan.batch.counters.push((master.id, count));
    }

    plan
}

fn in_creation_order(mut versions: Vec<&Version>) -> Vec<(&Version, u64)> {
    versions.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then(a.number.cmp(&b.number))
            .then(a.id.cmp(&b.id))
    });
    versions
        .into_iter()
        .enumerate()
        .map(|(i, v)| (v, i as u64 + 1))
        .collect()
}
