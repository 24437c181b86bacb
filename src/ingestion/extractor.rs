//! Content extraction

use crate::ingestion::error::{IngestError, IngestResult};
use crate::models::DocumentBody;
use crate::storage::{AuthToken, ResourceInfo, StorageError, StorageGateway};
use async_trait::async_trait;
use std::sync::Arc;

/// Turns a resource into the searchable body of its document
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, token: &AuthToken, info: &ResourceInfo) -> IngestResult<DocumentBody>;
}

/// Metadata only: title from the file name, no content
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicExtractor;

impl BasicExtractor {
    fn body(info: &ResourceInfo) -> DocumentBody {
        let stem = match info.name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => info.name.as_str(),
        };
        DocumentBody {
            title: Some(stem.to_string()),
            content: String::new(),
            mime_type: info.mime_type.clone(),
            tags: Vec::new(),
        }
    }
}

#[async_trait]
impl Extractor for BasicExtractor {
    async fn extract(&self, _token: &AuthToken, info: &ResourceInfo) -> IngestResult<DocumentBody> {
        Ok(Self::body(info))
    }
}

/// Reads the content of textual files, up to a byte limit
pub struct PlainTextExtractor {
    gateway: Arc<dyn StorageGateway>,
    max_bytes: usize,
}

impl PlainTextExtractor {
    pub fn new(gateway: Arc<dyn StorageGateway>, max_bytes: usize) -> Self {
        Self { gateway, max_bytes }
    }

    fn is_textual(mime_type: &str) -> bool {
        mime_type.starts_with("text/")
            || matches!(mime_type, "application/json" | "application/xml")
    }
}

#[async_trait]
impl Extractor for PlainTextExtractor {
    async fn extract(&self, token: &AuthToken, info: &ResourceInfo) -> IngestResult<DocumentBody> {
        let mut body = BasicExtractor::body(info);
        if info.is_folder() || !Self::is_textual(&info.mime_type) {
            return Ok(body);
        }

        let mut bytes = self
            .gateway
            .download(token, &info.id)
            .await
            .map_err(|e| match e {
                StorageError::Unavailable(_) => IngestError::Storage(e),
                other => IngestError::Extraction(format!("{}: {}", info.id, other)),
            })?;

        bytes.truncate(self.max_bytes);
        body.content = String::from_utf8_lossy(&bytes).into_owned();
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResourceId, UserId};
    use crate::storage::MemoryGateway;

    async fn setup() -> (Arc<MemoryGateway>, AuthToken, ResourceId) {
        let gateway = Arc::new(MemoryGateway::new());
        let root = ResourceId::new("storageid", "spaceid", "spaceid");
        gateway.add_user(UserId::new("owner"));
        gateway.create_space_root(root.clone(), "space");
        let token = gateway.authenticate(&UserId::new("owner")).await.unwrap();
        (gateway, token, root)
    }

    #[tokio::test]
    async fn test_plain_text_is_truncated() {
        let (gateway, token, root) = setup().await;
        let id = gateway.add_file(&root, "notes", "notes.txt", "hello world");
        let info = gateway.stat(&token, &id).await.unwrap();

        let extractor = PlainTextExtractor::new(gateway.clone(), 5);
        let body = extractor.extract(&token, &info).await.unwrap();
        assert_eq!(body.content, "hello");
        assert_eq!(body.title.as_deref(), Some("notes"));
        assert_eq!(body.mime_type, "text/plain");
    }

    #[tokio::test]
    async fn test_binary_files_are_not_downloaded() {
        let (gateway, token, root) = setup().await;
        let id = gateway.add_file(&root, "report", "report.pdf", vec![0u8, 159, 146, 150]);
        let info = gateway.stat(&token, &id).await.unwrap();

        let extractor = PlainTextExtractor::new(gateway.clone(), 1024);
        let body = extractor.extract(&token, &info).await.unwrap();
        assert!(body.content.is_empty());
        assert_eq!(gateway.download_calls(), 0);
    }

    #[tokio::test]
    async fn test_vanished_file_is_an_extraction_failure() {
        let (gateway, token, root) = setup().await;
        let id = gateway.add_file(&root, "gone", "gone.txt", "bye");
        let info = gateway.stat(&token, &id).await.unwrap();
        gateway.remove(&id);

        let extractor = PlainTextExtractor::new(gateway, 1024);
        let err = extractor.extract(&token, &info).await.unwrap_err();
        assert!(matches!(err, IngestError::Extraction(_)));
    }
}
