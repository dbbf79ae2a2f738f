use std::path::PathBuf;

use chrono::{Duration, TimeZone, Utc};

use dossier_types::{ContentDigest, Discipline, ProcessingStatus, ProjectId, Timestamp, VersionId};

use crate::records::{FileMeta, Group, Project, Version};
use crate::traits::RecordStore;

pub fn t(secs: i64) -> Timestamp {
    Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_else(Utc::now) + Duration::seconds(secs)
}

pub fn discipline(tag: &str) -> Discipline {
    Discipline::new(tag).unwrap()
}

pub fn project(store: &dyn RecordStore) -> Project {
    let project = Project::new("owner@example.com", t(0));
    store.insert_project(&project).unwrap();
    project
}

pub fn version(group: &Group, number: u64, at: Timestamp) -> Version {
    let body = format!("{}-{number}", group.id);
    Version {
        id: VersionId::new(),
        group_id: group.id,
        project_id: group.project_id,
        discipline: group.discipline.clone(),
        number,
        file: FileMeta {
            original_name: "plan.pdf".into(),
            stored_name: format!("plan_{number}.pdf"),
            stored_path: PathBuf::from(format!("/blobs/{}/v{number}/plan.pdf", group.project_id)),
            size: body.len() as u64,
            mime_type: "application/pdf".into(),
            digest: ContentDigest::of_bytes(body.as_bytes()),
        },
        uploaded_by: "architect@example.com".into(),
        upload_reason: None,
        is_active: false,
        processing_status: ProcessingStatus::Queued,
        result: None,
        failure_reason: None,
        created_at: at,
        updated_at: at,
    }
}

/// Reserve the next number and insert a version under it.
pub fn committed(store: &dyn RecordStore, group: &Group, at: Timestamp) -> Version {
    let number = store.increment_version_counter(&group.id).unwrap();
    let version = version(group, number, at);
    store.insert_version(&version).unwrap();
    version
}

/// Insert a group bypassing the group-key constraint (legacy stores only).
pub fn legacy_group(store: &dyn RecordStore, project_id: ProjectId, tag: &str, at: Timestamp) -> Group {
    let group = Group::new(project_id, discipline(tag), at);
    store.insert_group(&group).unwrap();
    group
}
