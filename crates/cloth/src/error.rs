//! Error types for data entering the cloth collection from outside.
//!
//! Caller bugs (bad indices, missing schema) are assertions, not errors.

/// Errors that can occur while loading archives or importing meshes.
#[derive(Debug, thiserror::Error)]
pub enum ClothError {
    #[error("Failed to serialize cloth collection: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Unsupported archive version {found} (newest supported is {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Invalid cloth schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    #[error(transparent)]
    Config(#[from] cloth_config::ConfigError),
}
