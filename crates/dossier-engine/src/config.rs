use std::time::Duration;

use serde::{Deserialize, Serialize};

use dossier_store::IntakePolicy;

/// When downstream validation runs relative to the upload response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Awaited before `upload` returns; the receipt carries the final status.
    #[default]
    Inline,
    /// Spawned on the runtime; the receipt reports `queued`.
    Background,
}

/// Versioning engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub validation_mode: ValidationMode,
    /// Age after which a queued or processing version counts as stuck.
    pub stuck_after_secs: u64,
    pub intake: IntakePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            validation_mode: ValidationMode::Inline,
            stuck_after_secs: 15 * 60,
            intake: IntakePolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn stuck_after(&self) -> Duration {
        Duration::from_secs(self.stuck_after_secs)
    }
}
