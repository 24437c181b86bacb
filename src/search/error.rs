//! Error types for search operations

use crate::error::AppError;
use crate::index::IndexError;
use crate::storage::StorageError;

/// Result type for search operations
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors that end an aggregate search
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    /// Empty query, malformed scope or unparsable query
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No caller identity, or the identity was rejected
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// The scope does not fall into any space visible to the caller
    #[error("Not found: {0}")]
    NotFound(String),

    /// The space listing failed, or every queried space failed
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The caller cancelled or the request deadline passed
    #[error("Search cancelled: {0}")]
    Cancelled(String),
}

impl From<IndexError> for SearchError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::InvalidQuery(msg) => SearchError::InvalidArgument(msg),
            other => SearchError::BackendUnavailable(other.to_string()),
        }
    }
}

impl From<StorageError> for SearchError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => SearchError::NotFound(msg),
            StorageError::PermissionDenied(msg) => SearchError::NotFound(msg),
            other => SearchError::BackendUnavailable(other.to_string()),
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidArgument(msg) => AppError::Validation(msg),
            SearchError::Unauthenticated(msg) => AppError::Authentication(msg),
            SearchError::NotFound(msg) => AppError::NotFound(msg),
            SearchError::BackendUnavailable(msg) => AppError::Unavailable(msg),
            SearchError::Cancelled(msg) => AppError::Cancelled(msg),
        }
    }
}
