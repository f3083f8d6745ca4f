//! CLI command implementations

pub mod check;
pub mod simulate;

use anyhow::{Context, Result};
use ember_particles::SceneConfig;

/// Load a scene file, with the path in any error
fn load_scene(path: &str) -> Result<SceneConfig> {
    SceneConfig::load(path).with_context(|| format!("Failed to load scene {}", path))
}
