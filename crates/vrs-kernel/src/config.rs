//! Kernel configuration
//!
//! Tunable selection behavior, stored as RON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DISTANCE_EDGE_MIN, DISTANCE_FACE_MIN, DISTANCE_VERTEX_MIN, MARGINAL_INCREASE,
};

/// Nearest-feature search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Selection radius for vertices, in model units
    pub vertex_distance: f64,
    /// Selection radius for edges, in model units
    pub edge_distance: f64,
    /// Selection radius for faces, in model units
    pub face_distance: f64,
    /// Factor applied to the best distance found so far
    pub marginal_increase: f64,
    /// Snap edge hits close to the midpoint onto it
    pub snap_midpoint: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            vertex_distance: DISTANCE_VERTEX_MIN,
            edge_distance: DISTANCE_EDGE_MIN,
            face_distance: DISTANCE_FACE_MIN,
            marginal_increase: MARGINAL_INCREASE,
            snap_midpoint: true,
        }
    }
}

/// Kernel configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub selection: SelectionConfig,
}

impl KernelConfig {
    /// Save the configuration to a RON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = self.to_ron_string()?;
        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Load a configuration from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_ron_str(&content)
    }

    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Parse a configuration; missing fields take their default value
    pub fn from_ron_str(content: &str) -> Result<Self, ConfigError> {
        let config: KernelConfig =
            ron::from_str(content).map_err(|e| ConfigError::Deserialize(e.to_string()))?;
        tracing::debug!("Loaded kernel configuration: {:?}", config);
        Ok(config)
    }
}

/// Configuration-related errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}
