use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::state::AppState;

/// Build the axum router with all Dossier endpoints.
pub fn build_router(state: AppState, max_upload_bytes: u64) -> Router {
    let limit = usize::try_from(max_upload_bytes).unwrap_or(usize::MAX);
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route(
            "/v1/projects/:project_id/uploads",
            post(handler::upload_handler).layer(DefaultBodyLimit::max(limit)),
        )
        .route("/v1/projects/:project_id/versions", get(handler::project_versions_handler))
        .route("/v1/groups/:group_id/activate", post(handler::activate_handler))
        .route("/v1/groups/:group_id/versions", get(handler::group_versions_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
