use std::io::Write;
use std::path::PathBuf;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use dossier_engine::{UploadReceipt, UploadRequest};
use dossier_ledger::Version;
use dossier_types::{Discipline, GroupId, ProjectId, VersionId};

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

const FILE_NAME_HEADER: &str = "x-file-name";
const ACTOR_HEADER: &str = "x-actor";
const ANONYMOUS: &str = "anonymous";

pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "name": "dossier",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub discipline: String,
    pub reason: Option<String>,
}

/// `POST /v1/projects/:project_id/uploads` with the file as the raw body.
pub async fn upload_handler(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<(StatusCode, Json<UploadReceipt>)> {
    let discipline = Discipline::new(&params.discipline)
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let original_name = header(&headers, FILE_NAME_HEADER)
        .ok_or_else(|| ServerError::BadRequest(format!("missing {FILE_NAME_HEADER} header")))?;
    let actor = header(&headers, ACTOR_HEADER).unwrap_or_else(|| ANONYMOUS.to_string());

    let temp_path = stage(state.staging_dir.clone(), body).await?;
    let receipt = state
        .engine
        .upload(UploadRequest {
            project_id,
            discipline,
            temp_path,
            original_name,
            actor,
            reason: params.reason,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

#[derive(Debug, Deserialize)]
pub struct ActivateBody {
    pub version_id: VersionId,
    pub actor: Option<String>,
}

/// `POST /v1/groups/:group_id/activate`
pub async fn activate_handler(
    State(state): State<AppState>,
    Path(group_id): Path<GroupId>,
    Json(body): Json<ActivateBody>,
) -> ServerResult<Json<Value>> {
    let actor = body.actor.unwrap_or_else(|| ANONYMOUS.to_string());
    let engine = state.engine;
    let version = blocking(move || Ok(engine.activate(&group_id, &body.version_id, &actor)?)).await?;
    Ok(Json(json!({ "active_version": version.number })))
}

/// `GET /v1/groups/:group_id/versions`, newest number first.
pub async fn group_versions_handler(
    State(state): State<AppState>,
    Path(group_id): Path<GroupId>,
) -> ServerResult<Json<Vec<Version>>> {
    let engine = state.engine;
    let versions = blocking(move || Ok(engine.group_versions(&group_id)?)).await?;
    Ok(Json(versions))
}

/// `GET /v1/projects/:project_id/versions`, newest upload first.
pub async fn project_versions_handler(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
) -> ServerResult<Json<Vec<Version>>> {
    let engine = state.engine;
    let versions = blocking(move || Ok(engine.project_versions(&project_id)?)).await?;
    Ok(Json(versions))
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Run record-store work off the async workers; snapshot-backed stores
/// take a lock and sync to disk on every write.
async fn blocking<T, F>(f: F) -> ServerResult<T>
where
    F: FnOnce() -> ServerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServerError::Internal(format!("blocking task failed: {e}")))?
}

/// Write the request body to a fresh file in the staging directory. The
/// engine takes ownership of the file from here on.
async fn stage(staging_dir: PathBuf, body: Bytes) -> ServerResult<PathBuf> {
    blocking(move || {
        std::fs::create_dir_all(&staging_dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".part")
            .tempfile_in(&staging_dir)?;
        file.write_all(&body)?;
        file.as_file().sync_all()?;
        file.into_temp_path()
            .keep()
            .map_err(|e| ServerError::Internal(e.to_string()))
    })
    .await
}
