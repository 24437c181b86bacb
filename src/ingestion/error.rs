//! Error types for ingestion

use crate::error::AppError;
use crate::index::IndexError;
use crate::storage::StorageError;

/// Result type for ingestion operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Errors raised while keeping an index in sync with storage
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Storage backend failed; the operation is aborted and may be retried
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Index backend failed; the operation is aborted and may be retried
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// Content of a single resource could not be extracted
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// An event payload could not be decoded
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// The event bus is gone
    #[error("Event channel closed")]
    ChannelClosed,

    /// Connecting to or subscribing on the message broker failed
    #[error("Broker error: {0}")]
    Broker(String),
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::InvalidEvent(err.to_string())
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Storage(e) => e.into(),
            IngestError::Index(e) => e.into(),
            IngestError::InvalidEvent(msg) => AppError::Validation(msg),
            IngestError::ChannelClosed => AppError::Unavailable("event channel closed".to_string()),
            IngestError::Broker(msg) => AppError::Unavailable(msg),
            IngestError::Extraction(msg) => AppError::Internal(msg),
        }
    }
}
