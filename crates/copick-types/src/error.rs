//! Error types for value validation and config loading.

use thiserror::Error;

/// Errors produced while constructing or validating copick values.
#[derive(Debug, Error)]
pub enum TypeError {
    /// Label 0 marks background voxels in a multilabel mask.
    #[error("label 0 is reserved for background")]
    ReservedLabel,

    #[error("color must have exactly 4 components (RGBA), got {actual}")]
    InvalidColorArity { actual: usize },

    #[error("color component {index} is {value}, expected a value in [0, 255]")]
    ColorOutOfRange { index: usize, value: i64 },

    #[error("transformation must be a 4x4 matrix, got {rows}x{cols}")]
    InvalidTransformShape { rows: usize, cols: usize },

    #[error("invalid transformation matrix: {reason}")]
    InvalidTransform { reason: String },

    #[error("voxel size must be a positive finite number, got {0}")]
    InvalidVoxelSize(f64),

    #[error("pickable object name {name} is declared more than once")]
    DuplicateObject { name: String },

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TypeError {
    pub(crate) fn invalid_transform(reason: impl Into<String>) -> Self {
        Self::InvalidTransform {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for TypeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<toml::de::Error> for TypeError {
    fn from(e: toml::de::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

/// Result alias for value construction and config loading.
pub type TypeResult<T> = Result<T, TypeError>;
