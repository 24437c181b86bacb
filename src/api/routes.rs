use crate::api::{handlers, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the main API router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        // Search
        .route("/v1/search", post(handlers::search))
        // Indexing
        .route("/v1/spaces/:space_id/index", post(handlers::index_space))
        .route("/v1/events", post(handlers::submit_event))
        // Add state
        .with_state(state)
        // Add middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(false))
                .on_response(DefaultOnResponse::new()),
        )
        .layer(CorsLayer::permissive())
}
