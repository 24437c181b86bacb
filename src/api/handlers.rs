use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::ingestion::{EventEnvelope, IndexSpaceReport};
use crate::models::{Match, SearchContext, SearchRequest, SpaceId, UserId};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

/// Header carrying the authenticated caller
pub const USER_ID_HEADER: &str = "x-user-id";

/// Optional header overriding the request deadline, in milliseconds
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout-ms";

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Search every space visible to the caller
pub async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let ctx = caller_context(&headers, state.request_timeout)?;

    let result = state.service.search(&ctx, &request).await?;

    Ok(Json(SearchResponse {
        request_id: ctx.request_id,
        total_matches: result.total_matches,
        matches: result.matches,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub request_id: Uuid,
    pub total_matches: u64,
    pub matches: Vec<Match>,
}

/// Index a whole space on behalf of its owner
pub async fn index_space(
    State(state): State<AppState>,
    Path(space_id): Path<String>,
    Json(request): Json<IndexSpaceRequest>,
) -> Result<Json<IndexSpaceReport>> {
    request.validate()?;

    let space_id: SpaceId = space_id
        .parse()
        .map_err(|e: crate::models::ParseSpaceIdError| AppError::Validation(e.to_string()))?;

    let report = state
        .service
        .index_space(&space_id, &UserId::new(request.owner_id))
        .await?;

    Ok(Json(report))
}

#[derive(Debug, Deserialize, Validate)]
pub struct IndexSpaceRequest {
    #[validate(length(min = 1))]
    pub owner_id: String,
}

/// Queue a lifecycle event for the consumer
pub async fn submit_event(
    State(state): State<AppState>,
    Json(envelope): Json<EventEnvelope>,
) -> Result<(StatusCode, Json<EventAckResponse>)> {
    let events = state
        .events
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("event ingestion is disabled".to_string()))?;

    let event_type = envelope.event.event_type();
    tracing::debug!(
        event_id = %envelope.metadata.event_id,
        event = event_type,
        space = %envelope.event.space_id(),
        "Inbound lifecycle event"
    );

    events.send(envelope.event).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EventAckResponse {
            status: "accepted".to_string(),
            event_id: envelope.metadata.event_id,
            event_type: event_type.to_string(),
        }),
    ))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventAckResponse {
    pub status: String,
    pub event_id: String,
    pub event_type: String,
}

/// Prometheus metrics endpoint
///
/// Returns metrics in Prometheus text exposition format
pub async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    if !state.prometheus_enabled {
        return (StatusCode::NOT_FOUND, "metrics disabled".to_string());
    }
    (StatusCode::OK, crate::metrics::gather_metrics())
}

/// Build the request context from the caller headers
fn caller_context(headers: &HeaderMap, default_timeout: Duration) -> Result<SearchContext> {
    let user = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(UserId::new);

    let timeout = match headers.get(REQUEST_TIMEOUT_HEADER) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "{} must be a positive number of milliseconds",
                    REQUEST_TIMEOUT_HEADER
                ))
            })?,
        None => default_timeout,
    };

    let ctx = match user {
        Some(user) => SearchContext::new(user),
        None => SearchContext::anonymous(),
    };
    Ok(ctx.with_timeout(timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_caller_context_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("einstein"));
        headers.insert(REQUEST_TIMEOUT_HEADER, HeaderValue::from_static("1500"));

        let ctx = caller_context(&headers, Duration::from_secs(30)).unwrap();
        assert_eq!(ctx.user, Some(UserId::new("einstein")));
        assert!(ctx.deadline.is_some());
    }

    #[test]
    fn test_missing_user_is_anonymous() {
        let ctx = caller_context(&HeaderMap::new(), Duration::from_secs(30)).unwrap();
        assert!(ctx.user.is_none());
    }

    #[test]
    fn test_bad_timeout_header() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_TIMEOUT_HEADER, HeaderValue::from_static("soon"));

        let err = caller_context(&headers, Duration::from_secs(30)).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }
}
