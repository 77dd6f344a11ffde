//! Shared configuration for the cloth collection
//!
//! This crate provides the single source of truth for the index sentinel,
//! the fixed attribute caps used when welding, and the geometric tolerances
//! used when unwrapping meshes into patterns.

use serde::{Deserialize, Serialize};

/// Sentinel stored in index columns and range pairs for "no element"
pub const INDEX_NONE: i32 = -1;

/// Default maximum number of bone influences kept per simulation vertex
pub const DEFAULT_MAX_BONE_INFLUENCES: usize = 12;

/// Default maximum number of tether attachments kept per simulation vertex
pub const DEFAULT_MAX_TETHER_ATTACHMENTS: usize = 4;

/// Default distance under which two unwrapped points are considered the same
pub const DEFAULT_WELDING_TOLERANCE: f32 = 0.01;

/// Squared length under which a vector is treated as zero before normalizing
pub const NORMAL_EPSILON: f32 = 1e-8;

/// Errors that can occur while loading a configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Configuration for welding and unwrapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClothConfig {
    /// Bone influences kept per vertex after a weld (heaviest first)
    pub max_bone_influences: usize,
    /// Tether attachments kept per vertex after a weld
    pub max_tether_attachments: usize,
    /// Distance under which unwrapped points are merged
    pub welding_tolerance: f32,
}

impl Default for ClothConfig {
    fn default() -> Self {
        Self {
            max_bone_influences: DEFAULT_MAX_BONE_INFLUENCES,
            max_tether_attachments: DEFAULT_MAX_TETHER_ATTACHMENTS,
            welding_tolerance: DEFAULT_WELDING_TOLERANCE,
        }
    }
}

impl ClothConfig {
    /// Parse a configuration from JSON, filling missing fields with defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to pretty-printed JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that every cap is usable and the tolerance is a positive number
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bone_influences == 0 {
            return Err(ConfigError::InvalidValue(
                "max_bone_influences must be at least 1".to_string(),
            ));
        }
        if self.max_tether_attachments == 0 {
            return Err(ConfigError::InvalidValue(
                "max_tether_attachments must be at least 1".to_string(),
            ));
        }
        if !(self.welding_tolerance.is_finite() && self.welding_tolerance > 0.0) {
            return Err(ConfigError::InvalidValue(format!(
                "welding_tolerance must be positive, got {}",
                self.welding_tolerance
            )));
        }
        Ok(())
    }
}
