use std::path::PathBuf;

use chrono::{Duration, TimeZone, Utc};

use dossier_ledger::{FileMeta, Group, Project, RecordStore, Version};
use dossier_types::{
    ContentDigest, Discipline, ProcessingStatus, ProjectId, Timestamp, VersionId,
};

pub fn t(secs: i64) -> Timestamp {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
}

pub fn project(store: &dyn RecordStore) -> Project {
    let project = Project::new("owner@example.com", t(0));
    store.insert_project(&project).unwrap();
    project
}

/// Insert a group directly, as the legacy write path did.
pub fn group(store: &dyn RecordStore, project_id: ProjectId, tag: &str, at: i64) -> Group {
    let group = Group::new(project_id, Discipline::new(tag).unwrap(), t(at));
    store.insert_group(&group).unwrap();
    group
}

pub fn version_record(group: &Group, number: u64, at: i64, active: bool, path: PathBuf, digest: ContentDigest) -> Version {
    Version {
        id: VersionId::new(),
        group_id: group.id,
        project_id: group.project_id,
        discipline: group.discipline.clone(),
        number,
        file: FileMeta {
            original_name: "plan.pdf".into(),
            stored_name: "plan.pdf".into(),
            stored_path: path,
            size: 0,
            mime_type: "application/pdf".into(),
            digest,
        },
        uploaded_by: "architect@example.com".into(),
        upload_reason: None,
        is_active: active,
        processing_status: ProcessingStatus::Done,
        result: None,
        failure_reason: None,
        created_at: t(at),
        updated_at: t(at),
    }
}

/// Insert a version with an arbitrary number, bumping the counter far
/// enough for the store to accept it.
pub fn version(store: &dyn RecordStore, group: &Group, number: u64, at: i64, active: bool) -> Version {
    while store.get_group(&group.id).unwrap().unwrap().current_version < number {
        store.increment_version_counter(&group.id).unwrap();
    }
    let path = PathBuf::from(format!("/blobs/{}/{}/v{number}/plan_{at}.pdf", group.project_id, group.discipline));
    let v = version_record(group, number, at, active, path, ContentDigest::of_bytes(&at.to_le_bytes()));
    store.insert_version(&v).unwrap();
    v
}
