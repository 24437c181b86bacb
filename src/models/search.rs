use crate::models::document::ResourceType;
use crate::models::resource::{Reference, ResourceId};
use crate::models::space::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Aggregate search request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text or field-qualified query
    pub query: String,

    /// Restricts the search to one space or a subtree of it
    #[serde(default)]
    pub scope: Option<Reference>,

    /// Maximum number of matches; 0 or absent means unbounded
    #[serde(default)]
    pub page_size: Option<usize>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_scope(mut self, scope: Reference) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Page size with 0 folded into "not given"
    pub fn effective_page_size(&self) -> Option<usize> {
        self.page_size.filter(|size| *size > 0)
    }
}

/// One hit in a result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// Id of the matched resource
    pub id: ResourceId,

    pub name: String,

    /// Location of the match relative to the space it was surfaced through
    pub reference: Reference,

    /// Opaque, non-negative relevance score
    pub score: f32,

    #[serde(default)]
    pub size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,

    #[serde(default)]
    pub mime_type: String,

    #[serde(default)]
    pub resource_type: ResourceType,
}

/// Ranked, truncated result of an aggregate search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub matches: Vec<Match>,

    /// Sum of the totals reported by every space that answered
    pub total_matches: u64,
}

/// Request-scoped caller context: identity, deadline and cancellation
#[derive(Debug, Clone)]
pub struct SearchContext {
    pub request_id: Uuid,
    pub user: Option<UserId>,
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
}

impl SearchContext {
    pub fn new(user: UserId) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user: Some(user),
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// A context without caller identity
    pub fn anonymous() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user: None,
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
