//! Scene system configuration loaded from `scene.toml`.
//!
//! Every key is optional; missing keys take the defaults below.
//!
//! ```toml
//! action_time_budget_ms = 8.0
//! loader_time_budget_ms = 6.0
//! parallel_spawn = true
//! parallel_deserialize = false
//! parallel_min_batch = 64
//! asset_root = "content"
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::assets::{AssetSource, DirectorySource, MemorySource};
use crate::parallel::ParConfig;
use crate::serialize::MIN_SUPPORTED_ENGINE_BUILD;

/// Tunables of the scene system.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    /// Time the action queue may spend per tick.
    pub action_time_budget_ms: f64,
    /// Time a scene load may spend per tick.
    pub loader_time_budget_ms: f64,
    pub parallel_spawn: bool,
    pub parallel_deserialize: bool,
    pub parallel_min_batch: usize,
    /// Worker count for parallel stages. `None` uses all cores.
    pub parallel_threads: Option<usize>,
    /// Oldest `EngineBuild` accepted for scenes.
    pub min_supported_build: u32,
    /// Save scenes again after loading them from an outdated layout.
    pub resave_deprecated: bool,
    /// Keep objects of unknown types as placeholders instead of dropping
    /// them.
    pub missing_object_placeholders: bool,
    /// Directory holding `<id>.json` documents. Documents live in memory
    /// when unset.
    pub asset_root: Option<String>,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            action_time_budget_ms: 8.0,
            loader_time_budget_ms: 6.0,
            parallel_spawn: true,
            parallel_deserialize: false,
            parallel_min_batch: 64,
            parallel_threads: None,
            min_supported_build: MIN_SUPPORTED_ENGINE_BUILD,
            resave_deprecated: true,
            missing_object_placeholders: true,
            asset_root: None,
        }
    }
}

impl SceneSettings {
    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("failed to parse scene settings: {e}"))
    }

    pub fn action_budget(&self) -> Duration {
        duration_ms(self.action_time_budget_ms)
    }

    pub fn loader_budget(&self) -> Duration {
        duration_ms(self.loader_time_budget_ms)
    }

    pub fn par_config(&self) -> ParConfig {
        ParConfig {
            min_batch_size: self.parallel_min_batch.max(1),
            num_threads: self.parallel_threads,
        }
    }

    /// Builds the document store named by `asset_root`.
    pub fn asset_source(&self) -> Arc<dyn AssetSource> {
        match &self.asset_root {
            Some(root) => {
                log::info!("Scene assets: directory {root:?}");
                Arc::new(DirectorySource::new(root))
            }
            None => {
                log::info!("Scene assets: in memory");
                Arc::new(MemorySource::new())
            }
        }
    }
}

fn duration_ms(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_secs_f64(ms / 1000.0)
    } else {
        Duration::ZERO
    }
}

/// Load scene settings from a TOML file.
///
/// Returns `Err` with a human-readable message if the file cannot be read
/// or parsed.
pub fn load_settings(path: &Path) -> Result<SceneSettings, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    toml::from_str(&content).map_err(|e| format!("failed to parse {}: {e}", path.display()))
}

/// Load scene settings, falling back to defaults when the file is missing
/// or invalid.
pub fn load_or_default(path: &Path) -> SceneSettings {
    match load_settings(path) {
        Ok(settings) => {
            log::info!("Loaded scene settings from {}", path.display());
            settings
        }
        Err(e) => {
            log::warn!("{e}; using default scene settings");
            SceneSettings::default()
        }
    }
}
