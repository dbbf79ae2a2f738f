use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use dossier_ledger::{
    Constraint, Group, InvariantValidator, RecordStore, ValidationReport, Version,
};
use dossier_types::{Discipline, GroupId, ProjectId};

use crate::error::RepairResult;
use crate::plan::{plan_bucket, BucketPlan};

/// Summary of a repair run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RepairReport {
    pub dry_run: bool,
    pub buckets_examined: usize,
    pub buckets_repaired: usize,
    pub merged_groups: usize,
    pub resequenced_groups: usize,
    pub deactivated: usize,
    pub activated: usize,
    pub counters_reset: usize,
    /// Constraints installed by this run (would be installed, on a dry run).
    pub constraints_installed: Vec<Constraint>,
    /// Diagnostics before any change.
    pub before: ValidationReport,
    /// Diagnostics after the run. Absent on a dry run.
    pub after: Option<ValidationReport>,
}

impl RepairReport {
    pub fn changed_anything(&self) -> bool {
        self.buckets_repaired > 0 || !self.constraints_installed.is_empty()
    }

    fn absorb(&mut self, plan: &BucketPlan) {
        self.buckets_repaired += 1;
        self.merged_groups += plan.merged_groups;
        self.resequenced_groups += plan.resequenced_groups;
        self.deactivated += plan.deactivated;
        self.activated += plan.activated;
        self.counters_reset += plan.counters_reset;
    }
}

/// Batch consistency repair over a record store.
pub struct Repairer {
    store: Arc<dyn RecordStore>,
}

impl Repairer {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Report invariant violations without writing anything.
    pub fn diagnose(&self) -> RepairResult<ValidationReport> {
        Ok(InvariantValidator::validate(self.store.as_ref())?)
    }

    /// Plan every bucket that needs changes, in key order.
    pub fn plan(&self) -> RepairResult<Vec<BucketPlan>> {
        let groups = self.store.list_groups()?;
        let versions = self.store.list_versions()?;

        let mut buckets: BTreeMap<(ProjectId, Discipline), Vec<Group>> = BTreeMap::new();
        for group in groups {
            buckets
                .entry((group.project_id, group.discipline.clone()))
                .or_default()
                .push(group);
        }
        let mut by_group: BTreeMap<GroupId, Vec<Version>> = BTreeMap::new();
        for version in versions {
            by_group.entry(version.group_id).or_default().push(version);
        }

        let mut plans = Vec::with_capacity(buckets.len());
        for bucket in buckets.values() {
            let owned: Vec<Version> = bucket
                .iter()
                .filter_map(|g| by_group.get(&g.id))
                .flatten()
                .cloned()
                .collect();
            plans.push(plan_bucket(bucket, &owned));
        }
        Ok(plans)
    }

    /// Repair every bucket, one atomic batch each, then install the
    /// uniqueness constraints. With `dry_run` nothing is written.
    ///
    /// Re-running after an interruption resumes where the last run stopped;
    /// re-running after success changes nothing.
    pub fn run(&self, dry_run: bool) -> RepairResult<RepairReport> {
        let mut report = RepairReport {
            dry_run,
            before: self.diagnose()?,
            ..RepairReport::default()
        };

        let plans = self.plan()?;
        report.buckets_examined = plans.len();
        for plan in plans.iter().filter(|p| !p.is_noop()) {
            let master = plan.master.map(|id| id.to_string()).unwrap_or_default();
            if dry_run {
                info!(
                    %master,
                    merged = plan.merged_groups,
                    resequenced = plan.resequenced_groups,
                    deactivated = plan.deactivated,
                    activated = plan.activated,
                    counters_reset = plan.counters_reset,
                    "would repair bucket"
                );
            } else {
                self.store.apply_repair(&plan.batch)?;
                info!(
                    %master,
                    merged = plan.merged_groups,
                    resequenced = plan.resequenced_groups,
                    deactivated = plan.deactivated,
                    activated = plan.activated,
                    counters_reset = plan.counters_reset,
                    "repaired bucket"
                );
            }
            report.absorb(plan);
        }

        let installed = self.store.constraints()?;
        for constraint in Constraint::ALL {
            if installed.contains(constraint) {
                debug!(%constraint, "constraint already installed");
                continue;
            }
            if !dry_run {
                self.store.install_constraint(constraint)?;
                info!(%constraint, "installed constraint");
            }
            report.constraints_installed.push(constraint);
        }

        if !dry_run {
            report.after = Some(self.diagnose()?);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::fixtures::{group, project, version};
    use dossier_ledger::{ConstraintSet, LocalRecordStore, ViolationKind};

    fn legacy() -> Arc<LocalRecordStore> {
        Arc::new(LocalRecordStore::with_constraints(ConstraintSet::none()))
    }

    #[test]
    fn duplicate_groups_are_merged_into_the_oldest() {
        let store = legacy();
        let p = project(store.as_ref());
        let g1 = group(store.as_ref(), p.id, "villa_plan", 1);
        let g2 = group(store.as_ref(), p.id, "villa_plan", 2);
        let a = version(store.as_ref(), &g1, 1, 10, true);
        let b = version(store.as_ref(), &g2, 1, 20, true);

        let repairer = Repairer::new(store.clone());
        let report = repairer.run(false).unwrap();
        assert_eq!(report.merged_groups, 1);
        assert_eq!(report.before.count(ViolationKind::DuplicateGroup), 1);
        assert!(report.after.as_ref().unwrap().is_valid());
        assert_eq!(report.constraints_installed, Constraint::ALL.to_vec());

        let groups = store.list_groups().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, g1.id);
        assert_eq!(groups[0].current_version, 2);

        let a = store.get_version(&a.id).unwrap().unwrap();
        let b = store.get_version(&b.id).unwrap().unwrap();
        assert_eq!((a.group_id, a.number, a.is_active), (g1.id, 1, false));
        assert_eq!((b.group_id, b.number, b.is_active), (g1.id, 2, true));
        // Blob references are untouched.
        assert!(b.file.stored_path.to_string_lossy().contains("/v1/"));
        assert!(store.constraints().unwrap().is_complete());
    }

    #[test]
    fn second_run_changes_nothing() {
        let store = legacy();
        let p = project(store.as_ref());
        let g1 = group(store.as_ref(), p.id, "villa_plan", 1);
        let g2 = group(store.as_ref(), p.id, "villa_plan", 2);
        version(store.as_ref(), &g1, 1, 10, true);
        version(store.as_ref(), &g1, 3, 12, true);
        version(store.as_ref(), &g2, 1, 11, false);

        let repairer = Repairer::new(store.clone());
        repairer.run(false).unwrap();
        let groups = store.list_groups().unwrap();
        let versions = store.list_versions().unwrap();

        let again = repairer.run(false).unwrap();
        assert!(!again.changed_anything());
        assert!(again.before.is_valid());
        assert_eq!(store.list_groups().unwrap(), groups);
        assert_eq!(store.list_versions().unwrap(), versions);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let store = legacy();
        let p = project(store.as_ref());
        let g = group(store.as_ref(), p.id, "villa_plan", 1);
        version(store.as_ref(), &g, 1, 10, true);
        version(store.as_ref(), &g, 2, 11, true);

        let before = store.list_versions().unwrap();
        let report = Repairer::new(store.clone()).run(true).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.deactivated, 1);
        assert_eq!(report.constraints_installed.len(), 3);
        assert!(report.after.is_none());
        assert_eq!(store.list_versions().unwrap(), before);
        assert_eq!(store.constraints().unwrap(), ConstraintSet::none());
    }

    #[test]
    fn lone_group_keeps_its_active_version_when_resequenced() {
        let store = legacy();
        let p = project(store.as_ref());
        let g = group(store.as_ref(), p.id, "structural", 1);
        let v1 = version(store.as_ref(), &g, 1, 10, true);
        let v3 = version(store.as_ref(), &g, 3, 11, false);

        let report = Repairer::new(store.clone()).run(false).unwrap();
        assert_eq!(report.resequenced_groups, 1);
        assert_eq!(report.counters_reset, 1);
        let v1 = store.get_version(&v1.id).unwrap().unwrap();
        let v3 = store.get_version(&v3.id).unwrap().unwrap();
        assert_eq!((v1.number, v1.is_active), (1, true));
        assert_eq!((v3.number, v3.is_active), (2, false));
    }

    #[test]
    fn group_without_active_gets_its_highest_activated() {
        let store = legacy();
        let p = project(store.as_ref());
        let g = group(store.as_ref(), p.id, "mep", 1);
        version(store.as_ref(), &g, 1, 10, false);
        let top = version(store.as_ref(), &g, 2, 11, false);

        let report = Repairer::new(store.clone()).run(false).unwrap();
        assert_eq!(report.activated, 1);
        assert_eq!(report.resequenced_groups, 0);
        assert!(store.get_version(&top.id).unwrap().unwrap().is_active);
    }

    #[test]
    fn consistent_store_only_gains_constraints() {
        let store = legacy();
        let p = project(store.as_ref());
        let g = group(store.as_ref(), p.id, "villa_plan", 1);
        version(store.as_ref(), &g, 1, 10, false);
        version(store.as_ref(), &g, 2, 11, true);

        let report = Repairer::new(store.clone()).run(false).unwrap();
        assert_eq!(report.buckets_examined, 1);
        assert_eq!(report.buckets_repaired, 0);
        assert_eq!(report.constraints_installed.len(), 3);
    }

    /// (group index, number, creation offset, active)
    fn legacy_rows() -> impl Strategy<Value = (usize, Vec<(usize, u64, i64, bool)>)> {
        (1usize..4).prop_flat_map(|groups| {
            (
                Just(groups),
                prop::collection::vec((0..groups, 1u64..6, 0i64..50, any::<bool>()), 0..12),
            )
        })
    }

    proptest! {
        /// Any legacy bucket repairs to dense numbering with one active
        /// version, and a second run is a no-op.
        #[test]
        fn repaired_bucket_is_dense_and_stable((groups, rows) in legacy_rows()) {
            let store = legacy();
            let p = project(store.as_ref());
            let gs: Vec<Group> = (0..groups)
                .map(|i| group(store.as_ref(), p.id, "villa_plan", i as i64))
                .collect();
            for (gi, number, at, active) in &rows {
                version(store.as_ref(), &gs[*gi], *number, 100 + at, *active);
            }

            let repairer = Repairer::new(store.clone());
            let report = repairer.run(false).unwrap();
            prop_assert!(report.after.unwrap().is_valid());

            let remaining = store.list_groups().unwrap();
            prop_assert_eq!(remaining.len(), 1);
            prop_assert_eq!(remaining[0].id, gs[0].id);
            let versions = store.versions_for_group(&gs[0].id).unwrap();
            prop_assert_eq!(versions.len(), rows.len());
            let numbers: Vec<u64> = versions.iter().map(|v| v.number).collect();
            prop_assert_eq!(numbers, (1..=rows.len() as u64).collect::<Vec<_>>());
            prop_assert_eq!(
                versions.iter().filter(|v| v.is_active).count(),
                usize::from(!rows.is_empty())
            );

            let again = repairer.run(false).unwrap();
            prop_assert!(!again.changed_anything());
        }
    }
}
