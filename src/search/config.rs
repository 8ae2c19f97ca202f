//! Search configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-field relevance weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    /// Multiplier for token occurrences in the title
    pub title: f64,

    /// Multiplier for token occurrences in the description
    pub description: f64,

    /// Multiplier for token occurrences in keywords and searchable fields
    pub other: f64,

    /// Added when the normalized title equals the normalized query
    pub exact_title_boost: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            title: 3.0,
            description: 1.0,
            other: 0.5,
            exact_title_boost: 10.0,
        }
    }
}

/// Search engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Page size used when the request omits one or sends a non-positive value
    pub default_page_size: usize,

    /// Upper clamp for requested page sizes
    pub max_page_size: usize,

    /// Guests never receive more than this many results per page
    pub guest_page_cap: usize,

    /// Maximum suggestions returned by autocomplete
    pub autocomplete_limit: usize,

    /// Minimum prefix length before autocomplete returns anything
    pub autocomplete_min_chars: usize,

    /// Relevance weights
    pub weights: RankingWeights,

    /// Candidate sets larger than this are scored on the rayon pool
    pub parallel_scoring_threshold: usize,

    /// End-to-end deadline for a search request in milliseconds
    pub search_timeout_ms: u64,

    /// Maximum wait for any partition or directory lock in milliseconds
    pub lock_timeout_ms: u64,

    /// Shown instead of a hidden restricted price
    pub price_placeholder: String,

    /// Maximum cached autocomplete responses
    pub suggestion_cache_capacity: u64,

    /// Lifetime of a cached autocomplete response in seconds
    pub suggestion_cache_ttl_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
            guest_page_cap: 10,
            autocomplete_limit: 10,
            autocomplete_min_chars: 2,
            weights: RankingWeights::default(),
            parallel_scoring_threshold: 2_048,
            search_timeout_ms: 2_000,
            lock_timeout_ms: 250,
            price_placeholder: "Contact for pricing".to_string(),
            suggestion_cache_capacity: 10_000,
            suggestion_cache_ttl_secs: 60,
        }
    }
}

impl SearchConfig {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn suggestion_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.suggestion_cache_ttl_secs)
    }
}

/// Builder for SearchConfig
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    pub fn default_page_size(mut self, size: usize) -> Self {
        self.config.default_page_size = size;
        self
    }

    pub fn max_page_size(mut self, size: usize) -> Self {
        self.config.max_page_size = size;
        self
    }

    pub fn guest_page_cap(mut self, cap: usize) -> Self {
        self.config.guest_page_cap = cap;
        self
    }

    pub fn autocomplete_limit(mut self, limit: usize) -> Self {
        self.config.autocomplete_limit = limit;
        self
    }

    pub fn autocomplete_min_chars(mut self, chars: usize) -> Self {
        self.config.autocomplete_min_chars = chars;
        self
    }

    pub fn weights(mut self, weights: RankingWeights) -> Self {
        self.config.weights = weights;
        self
    }

    pub fn parallel_scoring_threshold(mut self, threshold: usize) -> Self {
        self.config.parallel_scoring_threshold = threshold;
        self
    }

    pub fn search_timeout_ms(mut self, ms: u64) -> Self {
        self.config.search_timeout_ms = ms;
        self
    }

    pub fn lock_timeout_ms(mut self, ms: u64) -> Self {
        self.config.lock_timeout_ms = ms;
        self
    }

    pub fn price_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.config.price_placeholder = placeholder.into();
        self
    }

    pub fn suggestion_cache_capacity(mut self, capacity: u64) -> Self {
        self.config.suggestion_cache_capacity = capacity;
        self
    }

    pub fn suggestion_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.suggestion_cache_ttl_secs = secs;
        self
    }

    pub fn build(self) -> SearchConfig {
        self.config
    }
}

impl Default for SearchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
