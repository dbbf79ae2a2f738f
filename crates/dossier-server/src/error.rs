use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use dossier_engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    /// HTTP status and stable error kind for the response body.
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Engine(e) => match e {
                EngineError::InvalidFormat(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_format"),
                EngineError::LockedProject(_) => (StatusCode::LOCKED, "locked_project"),
                EngineError::ConflictingActivation(_) => (StatusCode::CONFLICT, "conflicting_activation"),
                EngineError::StorageFailure(_) => (StatusCode::SERVICE_UNAVAILABLE, "storage_failure"),
                EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                EngineError::Ledger(_) | EngineError::Internal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal")
                }
            },
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::Io(_) => (StatusCode::SERVICE_UNAVAILABLE, "storage_failure"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, kind) = self.classify();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, Json(json!({ "error": kind, "message": self.to_string() }))).into_response()
    }
}
