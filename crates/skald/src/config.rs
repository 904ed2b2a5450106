//! Renderer configuration, loadable from JSON.
//!
//! ```json
//! { "batch_size": 2000, "round_pixels": true }
//! ```
//!
//! Every field is optional; missing ones take the defaults below.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Quads per vertex batch.
    pub batch_size: usize,
    /// Upper bound on textures per batch; the backend's own limit also applies.
    pub max_texture_units: u32,
    /// Floor every vertex (batched) / every translation (canvas).
    pub round_pixels: bool,
    /// Skip quads whose screen bounds miss the viewport.
    pub cull: bool,
    /// Which GPU dirty flag of each texture belongs to this renderer.
    pub context_slot: usize,
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            batch_size: 4096,
            max_texture_units: 16,
            round_pixels: false,
            cull: true,
            context_slot: 0,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl RendererConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(ConfigError::Json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.max_texture_units == 0 {
            return Err(ConfigError::ZeroTextureUnits);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ZeroBatchSize,
    ZeroTextureUnits,
    Json(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroBatchSize => write!(f, "batch_size must be at least 1"),
            ConfigError::ZeroTextureUnits => write!(f, "max_texture_units must be at least 1"),
            ConfigError::Json(e) => write!(f, "invalid renderer config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Json(e) => Some(e),
            _ => None,
        }
    }
}
