use std::path::PathBuf;

use tokio::net::TcpListener;

use dossier_engine::VersioningEngine;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;
use crate::state::AppState;

/// Dossier HTTP server.
pub struct DossierServer {
    config: ServerConfig,
    state: AppState,
}

impl DossierServer {
    pub fn new(config: ServerConfig, engine: VersioningEngine, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            state: AppState {
                engine,
                staging_dir: staging_dir.into(),
            },
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone(), self.config.max_upload_bytes)
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "dossier server listening");
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
