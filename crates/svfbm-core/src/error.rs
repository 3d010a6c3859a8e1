//! Error types for core image and field operations.

use thiserror::Error;

/// Errors raised by geometry, image and field primitives.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Tensor shape does not agree with the declared geometry.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Degenerate spacing or direction.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A volume with no voxels.
    #[error("Empty volume: {0}")]
    EmptyVolume(String),

    /// Tensor data could not be read back to the host.
    #[error("Tensor data error: {0}")]
    TensorData(String),

    /// Parameter outside its valid range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }

    pub fn empty_volume(msg: impl Into<String>) -> Self {
        Self::EmptyVolume(msg.into())
    }

    pub fn tensor_data(msg: impl Into<String>) -> Self {
        Self::TensorData(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
