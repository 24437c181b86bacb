//! Space-scoped search aggregation
//!
//! A search runs through [`SearchAggregator`]: the caller's visible spaces
//! are resolved, planned into targets (mountpoints stand in for the grants
//! they mirror), translated into per-partition [`IndexQuery`]s, dispatched
//! concurrently and merged into one ranked page.
//!
//! # Example
//!
//! ```no_run
//! use space_search::models::{SearchContext, SearchRequest, UserId};
//! use space_search::search::SearchService;
//!
//! # async fn run(service: SearchService) -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = SearchContext::new(UserId::new("einstein"));
//! let result = service
//!     .search(&ctx, &SearchRequest::new("Name:*.pdf").with_page_size(20))
//!     .await?;
//! println!("{} of {} matches", result.matches.len(), result.total_matches);
//! # Ok(())
//! # }
//! ```
//!
//! [`IndexQuery`]: crate::index::IndexQuery

mod aggregator;
mod config;
mod error;
mod resolver;
mod service;
mod translator;

pub use aggregator::{SearchAggregator, SearchState};
pub use config::{SearchConfig, SearchConfigBuilder};
pub use error::{Result, SearchError};
pub use resolver::{plan_targets, validate_scope, SearchTarget, SpaceResolver, TargetKind};
pub use service::SearchService;
pub use translator::{PathRewrite, QueryTranslator, TranslatedQuery};
