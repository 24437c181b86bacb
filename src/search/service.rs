//! Search service facade

use crate::index::IndexProvider;
use crate::ingestion::{Extractor, IndexSpaceReport, IngestResult, IngestionConfig, IngestionPipeline};
use crate::models::{SearchContext, SearchRequest, SearchResult, SpaceId, UserId};
use crate::search::aggregator::SearchAggregator;
use crate::search::config::SearchConfig;
use crate::search::error::Result;
use crate::storage::StorageGateway;
use std::sync::Arc;

/// Entry point for searching and indexing
pub struct SearchService {
    aggregator: SearchAggregator,
    pipeline: Arc<IngestionPipeline>,
}

impl SearchService {
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        indexes: Arc<dyn IndexProvider>,
        extractor: Arc<dyn Extractor>,
        search_config: SearchConfig,
        ingestion_config: IngestionConfig,
    ) -> Self {
        let aggregator = SearchAggregator::new(gateway.clone(), indexes.clone(), search_config);
        let pipeline = Arc::new(IngestionPipeline::new(
            gateway,
            indexes,
            extractor,
            ingestion_config,
        ));
        Self {
            aggregator,
            pipeline,
        }
    }

    /// Search every space visible to the caller, or the one named by the request scope
    pub async fn search(&self, ctx: &SearchContext, request: &SearchRequest) -> Result<SearchResult> {
        self.aggregator.search(ctx, request).await
    }

    /// Index a whole space on behalf of its owner
    pub async fn index_space(&self, space_id: &SpaceId, owner: &UserId) -> IngestResult<IndexSpaceReport> {
        self.pipeline.index_space(space_id, owner).await
    }

    /// Pipeline shared with the event consumer
    pub fn pipeline(&self) -> Arc<IngestionPipeline> {
        self.pipeline.clone()
    }

    pub fn config(&self) -> &SearchConfig {
        self.aggregator.config()
    }
}
