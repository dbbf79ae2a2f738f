use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use dossier_engine::EngineConfig;
use dossier_server::ServerConfig;

/// Top-level configuration, read from a TOML file.
///
/// Every field has a default, so an empty file (or none at all) yields a
/// working local setup under `./dossier-data`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DossierConfig {
    pub data_dir: PathBuf,
    /// Blob tree root. Defaults to `<data_dir>/blobs`.
    pub blob_dir: Option<PathBuf>,
    /// Record snapshot. Defaults to `<data_dir>/records.json`.
    pub records_file: Option<PathBuf>,
    /// Staging area for inbound uploads; must share a filesystem with the
    /// blob root. Defaults to `<data_dir>/staging`.
    pub staging_dir: Option<PathBuf>,
    pub server: ServerConfig,
    pub engine: EngineConfig,
}

impl Default for DossierConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("dossier-data"),
            blob_dir: None,
            records_file: None,
            staging_dir: None,
            server: ServerConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl DossierConfig {
    /// Load from `path`, or return the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.blob_dir.clone().unwrap_or_else(|| self.data_dir.join("blobs"))
    }

    pub fn records_file(&self) -> PathBuf {
        self.records_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("records.json"))
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("staging"))
    }
}
