//! Error types for registration operations.

use svfbm_core::CoreError;
use thiserror::Error;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Failure in an image, field or filter primitive.
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// Parameter values that cannot produce a run.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Input volumes unusable as a registration pair.
    #[error("Image validation error: {0}")]
    ImageValidation(String),

    /// Non-finite values appeared in a field.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    /// The worker pool could not be created.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn image_validation(msg: impl Into<String>) -> Self {
        Self::ImageValidation(msg.into())
    }

    pub fn numerical_instability(msg: impl Into<String>) -> Self {
        Self::NumericalInstability(msg.into())
    }

    pub fn thread_pool(msg: impl Into<String>) -> Self {
        Self::ThreadPool(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistrationError::invalid_configuration("zero levels");
        assert_eq!(err.to_string(), "Invalid configuration: zero levels");
    }

    #[test]
    fn test_core_error_converts() {
        fn fails() -> Result<()> {
            Err(CoreError::empty_volume("no voxels"))?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert!(matches!(err, RegistrationError::Core(CoreError::EmptyVolume(_))));
        assert!(err.to_string().contains("no voxels"));
    }
}
