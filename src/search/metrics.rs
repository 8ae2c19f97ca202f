//! Prometheus metrics for search and indexing

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec,
};

/// Search engine metrics
pub struct SearchMetrics {
    /// Search requests by caller state (guest, authenticated)
    pub search_requests: CounterVec,

    /// Failed searches and autocompletes by error kind
    pub search_errors: CounterVec,

    /// End-to-end latency by operation (search, autocomplete)
    pub search_latency: HistogramVec,

    /// Index mutations by entity type and outcome
    pub index_mutations: CounterVec,

    /// Out-of-scope documents that reached the visibility filter
    pub visibility_violations: CounterVec,

    /// Autocomplete requests
    pub autocomplete_requests: Counter,

    /// Autocomplete responses served from the suggestion cache
    pub autocomplete_cache_hits: Counter,
}

lazy_static! {
    pub static ref SEARCH_METRICS: SearchMetrics = SearchMetrics {
        search_requests: register_counter_vec!(
            "search_requests_total",
            "Total number of search requests",
            &["caller"]
        )
        .unwrap(),

        search_errors: register_counter_vec!(
            "search_errors_total",
            "Total number of failed search and autocomplete requests",
            &["kind"]
        )
        .unwrap(),

        search_latency: register_histogram_vec!(
            "search_latency_seconds",
            "Search and autocomplete latency in seconds",
            &["operation"]
        )
        .unwrap(),

        index_mutations: register_counter_vec!(
            "index_mutations_total",
            "Total number of index mutations",
            &["entity_type", "outcome"]
        )
        .unwrap(),

        visibility_violations: register_counter_vec!(
            "visibility_violations_total",
            "Documents outside the caller scope that reached the visibility filter",
            &["entity_type"]
        )
        .unwrap(),

        autocomplete_requests: register_counter!(
            "autocomplete_requests_total",
            "Total number of autocomplete requests"
        )
        .unwrap(),

        autocomplete_cache_hits: register_counter!(
            "autocomplete_cache_hits_total",
            "Autocomplete responses served from cache"
        )
        .unwrap(),
    };
}

/// Initialize search metrics
pub fn init_search_metrics() {
    lazy_static::initialize(&SEARCH_METRICS);
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> String {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_and_render() {
        init_search_metrics();
        SEARCH_METRICS
            .index_mutations
            .with_label_values(&["part", "inserted"])
            .inc();
        SEARCH_METRICS.autocomplete_requests.inc();

        let text = gather_text();
        assert!(text.contains("index_mutations_total"));
        assert!(text.contains("autocomplete_requests_total"));
    }
}
