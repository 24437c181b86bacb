//! Error types for storage gateway operations

use crate::error::AppError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors surfaced by the storage backend
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// The backend could not be reached or failed internally
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    /// The addressed resource, space or user does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller may not access the resource
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Fixture or payload could not be decoded
    #[error("Invalid storage data: {0}")]
    InvalidData(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::InvalidData(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable(msg) => AppError::Unavailable(msg),
            StorageError::NotFound(msg) => AppError::NotFound(msg),
            StorageError::PermissionDenied(msg) => AppError::Authorization(msg),
            StorageError::InvalidData(msg) => AppError::Internal(msg),
        }
    }
}
