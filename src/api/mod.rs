pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::{ingestion::EventSender, search::SearchService};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SearchService>,

    /// Lifecycle event bus; `None` when event ingestion is disabled
    pub events: Option<EventSender>,

    /// Deadline applied to searches without an `x-request-timeout-ms` header
    pub request_timeout: Duration,

    pub prometheus_enabled: bool,

    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: Arc<SearchService>) -> Self {
        Self {
            service,
            events: None,
            request_timeout: Duration::from_secs(30),
            prometheus_enabled: true,
            started_at: Instant::now(),
        }
    }

    /// Accept lifecycle events over HTTP
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_prometheus(mut self, enabled: bool) -> Self {
        self.prometheus_enabled = enabled;
        self
    }
}
