//! Per-space index backends
//!
//! Every storage space owns one index partition keyed by [`SpaceKey`]. The
//! aggregator and the ingestion pipeline reach partitions only through the
//! [`IndexProvider`] trait, so the concrete backend ([`MemoryIndex`] or
//! [`TantivyIndex`]) is a configuration detail.

mod config;
mod error;
mod memory;
pub mod query;
mod registry;
mod tantivy_index;

pub use config::{IndexBackendKind, IndexConfig, IndexConfigBuilder};
pub use error::{IndexError, IndexResult};
pub use memory::MemoryIndex;
pub use query::{Clause, Comparison, Field, QueryExpr};
pub use registry::IndexRegistry;
pub use tantivy_index::TantivyIndex;

use crate::models::{Document, Match, ResourceId, SpaceKey};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A query addressed to one index partition
#[derive(Debug, Clone)]
pub struct IndexQuery {
    /// Normalised query text, as it reaches the backend
    pub query: String,

    /// Parsed form of `query`
    pub expr: QueryExpr,

    /// Root of the space whose partition is queried
    pub root: ResourceId,

    /// Only documents strictly below this relative path match
    pub scope_path: Option<String>,

    /// Maximum number of matches to return; `None` is unbounded
    pub limit: Option<usize>,
}

impl IndexQuery {
    /// Normalise and parse `query` for the partition rooted at `root`
    pub fn parse(query: &str, root: ResourceId) -> IndexResult<Self> {
        let query = query::normalize(query);
        let expr = query::parse(&query)?;
        Ok(Self {
            query,
            expr,
            root,
            scope_path: None,
            limit: None,
        })
    }

    pub fn with_scope_path(mut self, path: impl Into<String>) -> Self {
        self.scope_path = Some(path.into());
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

/// Ranked page of one partition's matches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexHits {
    /// At most `limit` matches, score descending; references are space-root relative
    pub matches: Vec<Match>,

    /// Number of matching documents before the limit was applied
    pub total_matches: u64,
}

/// A searchable store holding the documents of one space
#[async_trait]
pub trait IndexBackend: Send + Sync {
    async fn search(&self, query: &IndexQuery) -> IndexResult<IndexHits>;

    /// Insert or replace the document keyed by `document.id`
    async fn upsert(&self, document: Document) -> IndexResult<()>;

    /// Insert or replace a batch of documents as one write
    async fn upsert_many(&self, documents: Vec<Document>) -> IndexResult<()> {
        for document in documents {
            self.upsert(document).await?;
        }
        Ok(())
    }

    /// Remove a document and every document below it; returns how many were removed
    async fn remove(&self, id: &ResourceId) -> IndexResult<usize>;

    async fn doc_count(&self) -> IndexResult<u64>;

    async fn lookup(&self, id: &ResourceId) -> IndexResult<Option<Document>>;

    /// Drop every document of the partition
    async fn clear(&self) -> IndexResult<()>;
}

/// Resolves the index partition of a space
#[async_trait]
pub trait IndexProvider: Send + Sync {
    async fn index_for(&self, key: &SpaceKey) -> IndexResult<Arc<dyn IndexBackend>>;
}

/// Build the match for a stored document, relative to its space root
pub(crate) fn document_match(document: &Document, score: f32) -> Match {
    Match {
        id: document.id.clone(),
        name: document.name.clone(),
        reference: crate::models::Reference::new(document.root.clone(), document.path.clone()),
        score,
        size: document.size,
        mtime: Some(document.mtime),
        mime_type: document.body.mime_type.clone(),
        resource_type: document.resource_type,
    }
}
