//! Prometheus metrics for search, ingestion and lifecycle events

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec,
};

/// Service metrics
pub struct SearchMetrics {
    /// Aggregate searches by outcome (ok, partial, empty, failed)
    pub searches: CounterVec,

    /// Per-space backend queries by outcome (ok, error, timeout)
    pub space_queries: CounterVec,

    /// Aggregate search latency
    pub search_latency: HistogramVec,

    /// Searches where at least one space failed and at least one answered
    pub partial_failures: CounterVec,

    /// Documents written or removed, by operation
    pub indexed_documents: CounterVec,

    /// Resources skipped because extraction failed
    pub extraction_failures: CounterVec,

    /// Lifecycle events consumed, by event type and outcome
    pub events: CounterVec,
}

lazy_static! {
    pub static ref SEARCH_METRICS: SearchMetrics = SearchMetrics {
        searches: register_counter_vec!(
            "space_search_searches_total",
            "Total number of aggregate searches",
            &["outcome"]
        )
        .unwrap(),

        space_queries: register_counter_vec!(
            "space_search_space_queries_total",
            "Total number of per-space index queries",
            &["kind", "outcome"]
        )
        .unwrap(),

        search_latency: register_histogram_vec!(
            "space_search_search_latency_seconds",
            "Aggregate search latency in seconds",
            &["scoped"]
        )
        .unwrap(),

        partial_failures: register_counter_vec!(
            "space_search_partial_failures_total",
            "Total number of searches answered with some spaces failing",
            &["scoped"]
        )
        .unwrap(),

        indexed_documents: register_counter_vec!(
            "space_search_indexed_documents_total",
            "Total number of documents upserted or removed",
            &["operation"]
        )
        .unwrap(),

        extraction_failures: register_counter_vec!(
            "space_search_extraction_failures_total",
            "Total number of resources skipped because extraction failed",
            &["mime_type"]
        )
        .unwrap(),

        events: register_counter_vec!(
            "space_search_events_total",
            "Total number of lifecycle events consumed",
            &["event", "outcome"]
        )
        .unwrap(),
    };
}

/// Render every registered metric in the Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;

    // Touch the lazy static so the families exist before the first search
    lazy_static::initialize(&SEARCH_METRICS);

    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_contains_search_families() {
        SEARCH_METRICS.searches.with_label_values(&["ok"]).inc();
        let output = gather_metrics();
        assert!(output.contains("space_search_searches_total"));
    }
}
