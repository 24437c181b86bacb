//! Error types for index operations

use crate::error::AppError;

/// Result type for index operations
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Errors that can occur inside an index backend
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The query could not be parsed
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Index initialization failed
    #[error("Index initialization failed: {0}")]
    InitFailed(String),

    /// Search execution failed
    #[error("Search execution failed: {0}")]
    SearchFailed(String),

    /// Document indexing or deletion failed
    #[error("Document indexing failed: {0}")]
    IndexingFailed(String),

    /// The backend is temporarily unable to serve requests
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Tantivy error
    #[error("Tantivy error: {0}")]
    Tantivy(String),
}

impl From<tantivy::TantivyError> for IndexError {
    fn from(err: tantivy::TantivyError) -> Self {
        IndexError::Tantivy(err.to_string())
    }
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::InvalidQuery(msg) => AppError::Validation(msg),
            IndexError::Unavailable(msg) => AppError::Unavailable(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}
