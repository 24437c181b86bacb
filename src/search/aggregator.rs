//! Search aggregation: fan-out, merge and ranking across spaces

use crate::index::{query, IndexHits, IndexProvider};
use crate::metrics::SEARCH_METRICS;
use crate::models::{Match, SearchContext, SearchRequest, SearchResult, UserId};
use crate::search::config::SearchConfig;
use crate::search::error::{Result, SearchError};
use crate::search::resolver::{plan_targets, SearchTarget, SpaceResolver, TargetKind};
use crate::search::translator::QueryTranslator;
use crate::storage::{AuthToken, StorageError, StorageGateway};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use strum::Display;
use tokio::time::{sleep_until, timeout};
use tracing::{debug, info, warn};

/// Phases of one aggregate search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SearchState {
    Validating,
    Resolving,
    Dispatching,
    Merging,
    Done,
    Failed,
}

/// What one target contributed
enum SpaceOutcome {
    Answered(IndexHits),
    Failed(SearchError),
    TimedOut,
}

/// Fans a search out to every space visible to the caller and merges the answers
pub struct SearchAggregator {
    gateway: Arc<dyn StorageGateway>,
    indexes: Arc<dyn IndexProvider>,
    resolver: SpaceResolver,
    translator: QueryTranslator,
    config: SearchConfig,
}

impl SearchAggregator {
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        indexes: Arc<dyn IndexProvider>,
        config: SearchConfig,
    ) -> Self {
        Self {
            resolver: SpaceResolver::new(gateway.clone()),
            translator: QueryTranslator::new(gateway.clone()),
            gateway,
            indexes,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run an aggregate search on behalf of the caller in `ctx`
    pub async fn search(&self, ctx: &SearchContext, request: &SearchRequest) -> Result<SearchResult> {
        let start = Instant::now();
        let scoped = if request.scope.is_some() { "true" } else { "false" };

        let mut state = SearchState::Validating;
        let outcome = within_deadline(ctx, self.run(ctx, request, &mut state)).await;

        SEARCH_METRICS
            .search_latency
            .with_label_values(&[scoped])
            .observe(start.elapsed().as_secs_f64());

        match &outcome {
            Ok(result) => {
                transition(ctx, &mut state, SearchState::Done);
                info!(
                    request_id = %ctx.request_id,
                    matches = result.matches.len(),
                    total_matches = result.total_matches,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Search completed"
                );
            }
            Err(e) => {
                let failed_in = state;
                transition(ctx, &mut state, SearchState::Failed);
                SEARCH_METRICS.searches.with_label_values(&["failed"]).inc();
                warn!(
                    request_id = %ctx.request_id,
                    state = %failed_in,
                    error = %e,
                    "Search failed"
                );
            }
        }

        outcome
    }

    async fn run(
        &self,
        ctx: &SearchContext,
        request: &SearchRequest,
        state: &mut SearchState,
    ) -> Result<SearchResult> {
        let user = validate(ctx, request)?;

        transition(ctx, state, SearchState::Resolving);
        let token = self.authenticate(user).await?;
        let targets = match &request.scope {
            Some(scope) => vec![self.resolver.resolve_scope(&token, user, scope).await?],
            None => plan_targets(&self.resolver.resolve_spaces(user).await?),
        };

        if targets.is_empty() {
            debug!(request_id = %ctx.request_id, "No searchable spaces");
            SEARCH_METRICS.searches.with_label_values(&["empty"]).inc();
            return Ok(SearchResult::default());
        }

        transition(ctx, state, SearchState::Dispatching);
        let outcomes = self.dispatch(&token, request, &targets).await;

        transition(ctx, state, SearchState::Merging);
        self.merge(ctx, request, &targets, outcomes)
    }

    async fn authenticate(&self, user: &UserId) -> Result<AuthToken> {
        self.gateway.authenticate(user).await.map_err(|e| match e {
            StorageError::NotFound(msg) | StorageError::PermissionDenied(msg) => {
                SearchError::Unauthenticated(msg)
            }
            other => SearchError::BackendUnavailable(other.to_string()),
        })
    }

    /// Query every target concurrently; outcomes come back in target order
    async fn dispatch(
        &self,
        token: &AuthToken,
        request: &SearchRequest,
        targets: &[SearchTarget],
    ) -> Vec<SpaceOutcome> {
        let per_space_timeout = self.config.per_space_timeout();
        let limit = self.config.backend_limit(request.effective_page_size());
        let request = Arc::new(request.clone());

        // Each call owns its inputs so the fan-out future stays Send
        let calls: Vec<_> = targets
            .iter()
            .cloned()
            .enumerate()
            .map(|(position, target)| {
                let translator = self.translator.clone();
                let indexes = self.indexes.clone();
                let token = token.clone();
                let request = request.clone();
                async move {
                    let call = query_target(translator, indexes, token, request, target, limit);
                    let outcome = match timeout(per_space_timeout, call).await {
                        Ok(Ok(hits)) => SpaceOutcome::Answered(hits),
                        Ok(Err(e)) => SpaceOutcome::Failed(e),
                        Err(_) => SpaceOutcome::TimedOut,
                    };
                    (position, outcome)
                }
            })
            .collect();

        let mut results: Vec<(usize, SpaceOutcome)> = stream::iter(calls)
            .buffer_unordered(self.config.max_concurrent_spaces.max(1))
            .collect()
            .await;

        results.sort_by_key(|(position, _)| *position);
        results.into_iter().map(|(_, outcome)| outcome).collect()
    }

    fn merge(
        &self,
        ctx: &SearchContext,
        request: &SearchRequest,
        targets: &[SearchTarget],
        outcomes: Vec<SpaceOutcome>,
    ) -> Result<SearchResult> {
        let mut matches: Vec<Match> = Vec::new();
        let mut total_matches = 0u64;
        let mut failed = 0usize;

        for (target, outcome) in targets.iter().zip(outcomes) {
            let kind = match target.kind {
                TargetKind::Direct => target.space.kind.to_string(),
                TargetKind::Mountpoint { .. } => "mountpoint".to_string(),
            };
            let kind = kind.as_str();
            match outcome {
                SpaceOutcome::Answered(hits) => {
                    SEARCH_METRICS
                        .space_queries
                        .with_label_values(&[kind, "ok"])
                        .inc();
                    debug!(
                        request_id = %ctx.request_id,
                        space = %target.space.id,
                        matches = hits.matches.len(),
                        total_matches = hits.total_matches,
                        "Space answered"
                    );
                    total_matches += hits.total_matches;
                    matches.extend(hits.matches);
                }
                SpaceOutcome::Failed(e) => {
                    failed += 1;
                    SEARCH_METRICS
                        .space_queries
                        .with_label_values(&[kind, "error"])
                        .inc();
                    warn!(
                        request_id = %ctx.request_id,
                        space = %target.space.id,
                        error = %e,
                        "Space search failed"
                    );
                }
                SpaceOutcome::TimedOut => {
                    failed += 1;
                    SEARCH_METRICS
                        .space_queries
                        .with_label_values(&[kind, "timeout"])
                        .inc();
                    warn!(
                        request_id = %ctx.request_id,
                        space = %target.space.id,
                        timeout_ms = self.config.per_space_timeout_ms,
                        "Space search timed out"
                    );
                }
            }
        }

        let scoped = request.scope.is_some();
        if failed == targets.len() {
            return Err(SearchError::BackendUnavailable(format!(
                "all {} spaces failed",
                failed
            )));
        }
        if failed > 0 {
            SEARCH_METRICS
                .partial_failures
                .with_label_values(&[if scoped { "true" } else { "false" }])
                .inc();
            SEARCH_METRICS.searches.with_label_values(&["partial"]).inc();
            warn!(
                request_id = %ctx.request_id,
                failed,
                answered = targets.len() - failed,
                "Partial search failure"
            );
        } else {
            SEARCH_METRICS.searches.with_label_values(&["ok"]).inc();
        }

        if !scoped {
            matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        }
        if let Some(page_size) = request.effective_page_size() {
            matches.truncate(page_size);
        }

        Ok(SearchResult {
            matches,
            total_matches,
        })
    }
}

/// Race a search against the caller's cancellation and deadline; losing
/// drops every in-flight storage and index call
async fn within_deadline<T>(
    ctx: &SearchContext,
    search: impl Future<Output = Result<T>>,
) -> Result<T> {
    let deadline = async {
        match ctx.deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => {
            Err(SearchError::Cancelled("request cancelled".to_string()))
        }
        _ = deadline => {
            Err(SearchError::Cancelled("request deadline exceeded".to_string()))
        }
        outcome = search => outcome,
    }
}

async fn query_target(
    translator: QueryTranslator,
    indexes: Arc<dyn IndexProvider>,
    token: AuthToken,
    request: Arc<SearchRequest>,
    target: SearchTarget,
    limit: Option<usize>,
) -> Result<IndexHits> {
    let translated = translator
        .translate(&token, &request, &target, limit)
        .await?;
    let index = indexes.index_for(&translated.key).await?;
    let hits = index.search(&translated.query).await?;

    let matches = hits
        .matches
        .into_iter()
        .filter_map(|hit| translated.rewrite.apply(hit))
        .collect();

    Ok(IndexHits {
        matches,
        total_matches: hits.total_matches,
    })
}

/// Reject requests that must never reach a backend
fn validate<'a>(ctx: &'a SearchContext, request: &SearchRequest) -> Result<&'a UserId> {
    if request.query.trim().is_empty() {
        return Err(SearchError::InvalidArgument("query must not be empty".to_string()));
    }

    let user = ctx
        .user
        .as_ref()
        .ok_or_else(|| SearchError::Unauthenticated("no caller identity".to_string()))?;

    query::parse(&query::normalize(&request.query))?;
    Ok(user)
}

fn transition(ctx: &SearchContext, state: &mut SearchState, next: SearchState) {
    debug!(request_id = %ctx.request_id, from = %state, to = %next, "Search state");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_blank_query() {
        let ctx = SearchContext::new(UserId::new("user"));
        let err = validate(&ctx, &SearchRequest::new("   ")).unwrap_err();
        assert!(matches!(err, SearchError::InvalidArgument(_)));
    }

    #[test]
    fn test_validate_requires_identity() {
        let ctx = SearchContext::anonymous();
        let err = validate(&ctx, &SearchRequest::new("foo")).unwrap_err();
        assert!(matches!(err, SearchError::Unauthenticated(_)));
    }

    #[test]
    fn test_validate_rejects_unparsable_query() {
        let ctx = SearchContext::new(UserId::new("user"));
        let err = validate(&ctx, &SearchRequest::new("Size:huge")).unwrap_err();
        assert!(matches!(err, SearchError::InvalidArgument(_)));
    }
}
