use thiserror::Error;
use tinylink_core::{CoreError, StorageError};
use tinylink_generator::GeneratorError;

/// Result type for [`MappingService`](crate::MappingService) operations.
pub type Result<T> = std::result::Result<T, ShortenerError>;

#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("short code not found: {0}")]
    NotFound(String),
    #[error("failed to allocate a short code: {0}")]
    ShortenFailed(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ShortenerError {
    /// Returns `true` if the caller, not the system, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::NotFound(_))
    }
}

impl From<CoreError> for ShortenerError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidShortCode(message) | CoreError::InvalidUrl(message) => {
                Self::InvalidInput(message)
            }
        }
    }
}

impl From<GeneratorError> for ShortenerError {
    fn from(value: GeneratorError) -> Self {
        match value {
            GeneratorError::Exhausted { .. } => Self::ShortenFailed(value.to_string()),
            GeneratorError::Availability(e) => Self::Storage(e),
        }
    }
}
