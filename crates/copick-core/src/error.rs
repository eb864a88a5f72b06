//! Error types for entity tree operations.

use thiserror::Error;

use copick_types::{TypeError, VoxelSize};

/// Errors that can occur while navigating or mutating the entity tree.
///
/// A lookup that finds nothing is not an error: `get_*` operations return
/// `Ok(None)`.
#[derive(Debug, Error)]
pub enum CopickError {
    /// A value failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] TypeError),

    /// An entity with the same identity key already exists.
    #[error("{entity} {key} already exists")]
    Conflict { entity: &'static str, key: String },

    /// The pickable object is not declared in the project config.
    #[error("object name {name} not found in pickable objects")]
    UnknownObject { name: String },

    /// The voxel spacing does not exist in the run.
    #[error("voxel spacing {voxel_size} not found in voxel spacings for run {run}")]
    UnknownVoxelSpacing { voxel_size: VoxelSize, run: String },

    /// Neither the caller nor the project config provided a user id.
    #[error("user id must be set in the root config or supplied to {operation}")]
    MissingUserId { operation: &'static str },

    /// The backend does not implement a contract operation.
    #[error("{operation} is not implemented by this backend")]
    NotImplemented { operation: &'static str },

    /// The owner of a back-reference has been dropped.
    #[error("{entity} is detached from its parent")]
    Detached { entity: &'static str },

    /// The backend reported a runtime failure.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl CopickError {
    pub(crate) fn conflict(entity: &'static str, key: impl ToString) -> Self {
        Self::Conflict {
            entity,
            key: key.to_string(),
        }
    }

    pub(crate) fn poisoned(e: impl std::fmt::Display) -> Self {
        Self::LockPoisoned(e.to_string())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether the error is a dangling reference to an undeclared object or
    /// voxel spacing.
    pub fn is_referential(&self) -> bool {
        matches!(
            self,
            Self::UnknownObject { .. } | Self::UnknownVoxelSpacing { .. }
        )
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Convenience type alias for entity tree operations.
pub type CopickResult<T> = std::result::Result<T, CopickError>;
