use std::path::PathBuf;

use dossier_engine::VersioningEngine;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: VersioningEngine,
    /// Where upload bodies are staged; must share a filesystem with the
    /// blob root so the engine can move files into place.
    pub staging_dir: PathBuf,
}
