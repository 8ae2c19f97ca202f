//! Search coordinator
//!
//! Owns the index store and runs the request pipeline:
//! plan → lookup → rank → facets → page slice → visibility. Each stage is
//! preceded by a deadline check; nothing on the read path writes to the
//! index, so an abandoned search leaves no partial state behind.

use crate::ingest::{ApplyOutcome, ChangeEvent, ChangeOperation, DocumentNormalizer};
use crate::search::autocomplete::{rank_terms, SuggestionCache, SuggestionKey};
use crate::search::config::SearchConfig;
use crate::search::document::{Document, DocumentKey, EntityType};
use crate::search::error::{SearchError, SearchResult};
use crate::search::facets::{FacetAggregator, FacetResult};
use crate::search::index::{DeleteOutcome, IndexStats, IndexStore, UpsertOutcome};
use crate::search::metrics::SEARCH_METRICS;
use crate::search::policy::AccessPolicy;
use crate::search::query::{QueryPlan, QueryPlanner, SearchRequest};
use crate::search::ranking::RankingEngine;
use crate::search::schema::SchemaRegistry;
use crate::search::tokenizer::Tokenizer;
use crate::search::visibility::{AccessView, CallerContext, SearchHit, VisibilityFilter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Search response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Results on the requested page
    pub results: Vec<SearchHit>,

    /// Facet counts over every match, not just this page
    pub facets: Vec<FacetResult>,

    /// Total number of matches
    pub total: usize,

    /// Echoed page number
    pub page: usize,

    /// Effective page size after clamping and the guest cap
    pub page_size: usize,

    /// Execution time in milliseconds
    pub took_ms: u64,
}

/// Autocomplete request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutocompleteRequest {
    pub query: String,

    #[serde(rename = "type", default)]
    pub entity_type: Option<String>,

    /// Lowers the configured suggestion limit
    #[serde(default)]
    pub limit: Option<usize>,
}

impl AutocompleteRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Autocomplete response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutocompleteResponse {
    pub suggestions: Vec<String>,
}

/// Liveness summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub index_available: bool,
    pub generation: u64,
    pub cached_suggestions: u64,
}

/// Point in time after which a request gives up
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn none() -> Self {
        Self { at: None }
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Some(Instant::now() + timeout),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Fail with `Timeout` if the deadline passed before `stage`
    pub fn check(&self, stage: &str) -> SearchResult<()> {
        if self.is_expired() {
            Err(SearchError::Timeout(format!("deadline passed before {}", stage)))
        } else {
            Ok(())
        }
    }
}

/// Entry point for indexing, search and autocomplete
#[derive(Debug, Clone)]
pub struct SearchCoordinator {
    store: Arc<IndexStore>,
    policy: Arc<AccessPolicy>,
    planner: QueryPlanner,
    ranking: RankingEngine,
    facets: FacetAggregator,
    visibility: VisibilityFilter,
    normalizer: DocumentNormalizer,
    suggestions: SuggestionCache,
    tokenizer: Tokenizer,
    config: SearchConfig,
}

impl SearchCoordinator {
    /// Create a coordinator over the standard entity schemas
    pub fn new(config: SearchConfig, policy: AccessPolicy) -> Self {
        Self::with_schemas(config, SchemaRegistry::standard(), policy)
    }

    pub fn with_schemas(config: SearchConfig, schemas: SchemaRegistry, policy: AccessPolicy) -> Self {
        let tokenizer = Tokenizer::new();
        let schemas = Arc::new(schemas);
        let policy = Arc::new(policy);

        Self {
            store: Arc::new(IndexStore::new(tokenizer.clone(), config.lock_timeout())),
            planner: QueryPlanner::new(
                tokenizer.clone(),
                schemas.clone(),
                policy.clone(),
                config.clone(),
            ),
            ranking: RankingEngine::new(config.weights, config.parallel_scoring_threshold),
            facets: FacetAggregator::new(schemas.clone()),
            visibility: VisibilityFilter::new(config.guest_page_cap, config.price_placeholder.clone()),
            normalizer: DocumentNormalizer::new(schemas, tokenizer.clone()),
            suggestions: SuggestionCache::new(
                config.suggestion_cache_capacity,
                config.suggestion_cache_ttl(),
            ),
            policy,
            tokenizer,
            config,
        }
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Index a ready-made document
    pub fn index_document(&self, document: Document) -> SearchResult<UpsertOutcome> {
        self.store.upsert(document)
    }

    /// Remove a document as of `deleted_at`
    pub fn remove_document(
        &self,
        key: &DocumentKey,
        deleted_at: DateTime<Utc>,
    ) -> SearchResult<DeleteOutcome> {
        self.store.delete(key, deleted_at)
    }

    /// Normalize and apply one change event
    pub fn apply_change(&self, event: &ChangeEvent) -> SearchResult<ApplyOutcome> {
        match event.operation {
            ChangeOperation::Upsert => {
                let document = self.normalizer.normalize(event)?;
                self.store.upsert(document).map(ApplyOutcome::Upserted)
            }
            ChangeOperation::Delete => self
                .store
                .delete(&event.key(), event.updated_at)
                .map(ApplyOutcome::Deleted),
        }
    }

    /// Run a search on the blocking pool under the configured timeout
    pub async fn search(
        &self,
        request: SearchRequest,
        caller: CallerContext,
    ) -> SearchResult<SearchResponse> {
        let timeout = self.config.search_timeout();
        let deadline = Deadline::after(timeout);
        let coordinator = self.clone();

        let task = tokio::task::spawn_blocking(move || {
            coordinator.search_blocking(&request, &caller, deadline)
        });
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!(error = %e, "Search task failed");
                Err(SearchError::IndexUnavailable(format!("search task failed: {}", e)))
            }
            Err(_) => {
                SEARCH_METRICS
                    .search_errors
                    .with_label_values(&["timeout"])
                    .inc();
                Err(SearchError::Timeout(format!(
                    "search exceeded {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    /// Run a search on the current thread, honouring `deadline` between stages
    pub fn search_blocking(
        &self,
        request: &SearchRequest,
        caller: &CallerContext,
        deadline: Deadline,
    ) -> SearchResult<SearchResponse> {
        let started = Instant::now();
        SEARCH_METRICS
            .search_requests
            .with_label_values(&[caller.state().as_ref()])
            .inc();

        let result = self.execute(request, caller, deadline, started);

        SEARCH_METRICS
            .search_latency
            .with_label_values(&["search"])
            .observe(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            self.record_error("search", e);
        }
        result
    }

    fn execute(
        &self,
        request: &SearchRequest,
        caller: &CallerContext,
        deadline: Deadline,
        started: Instant,
    ) -> SearchResult<SearchResponse> {
        let mut plan = self.planner.plan(request, caller)?;
        plan.page_size = self.visibility.effective_page_size(&plan.view, plan.page_size);

        deadline.check("lookup")?;
        let candidates = self.store.lookup(&plan)?;

        deadline.check("ranking")?;
        let ranked = self.ranking.rank(candidates, &plan);

        deadline.check("facet aggregation")?;
        let facets = self.facets.aggregate(&ranked, &plan);

        deadline.check("visibility filtering")?;
        let total = ranked.len();
        let start = plan.offset().min(total);
        let end = start.saturating_add(plan.page_size).min(total);
        let results = self.visibility.apply(&plan.view, &ranked[start..end]);

        debug!(
            query = %plan.normalized_query,
            total,
            page = plan.page,
            page_size = plan.page_size,
            "Search complete"
        );
        Ok(response(results, facets, total, &plan, started))
    }

    /// Prefix suggestions for the last query token
    pub fn autocomplete(
        &self,
        request: &AutocompleteRequest,
        caller: &CallerContext,
    ) -> SearchResult<AutocompleteResponse> {
        let started = Instant::now();
        SEARCH_METRICS.autocomplete_requests.inc();

        let result = self.suggest(request, caller);

        SEARCH_METRICS
            .search_latency
            .with_label_values(&["autocomplete"])
            .observe(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            self.record_error("autocomplete", e);
        }
        result
    }

    fn suggest(
        &self,
        request: &AutocompleteRequest,
        caller: &CallerContext,
    ) -> SearchResult<AutocompleteResponse> {
        let tokens = self.tokenizer.tokenize(&request.query);
        let Some((prefix, leading)) = tokens.split_last() else {
            return Err(SearchError::EmptyQuery);
        };
        let types = EntityType::parse_filter(request.entity_type.as_deref())?;
        if request.query.trim().chars().count() < self.config.autocomplete_min_chars {
            return Ok(AutocompleteResponse {
                suggestions: Vec::new(),
            });
        }

        let limit = request
            .limit
            .unwrap_or(self.config.autocomplete_limit)
            .clamp(1, self.config.autocomplete_limit.max(1));
        let view = AccessView::resolve(caller, &self.policy);
        let key = SuggestionKey {
            generation: self.store.generation(),
            scope: view.scope().cache_key(),
            types: types.clone(),
            query: tokens.join(" "),
            limit,
        };

        let (suggestions, cached) = self.suggestions.get_or_compute(key, || {
            let counts = self.store.suggest(&types, view.scope(), prefix)?;
            let stem = leading.join(" ");
            Ok::<_, SearchError>(
                rank_terms(counts, limit)
                    .into_iter()
                    .map(|term| {
                        if stem.is_empty() {
                            term
                        } else {
                            format!("{} {}", stem, term)
                        }
                    })
                    .collect(),
            )
        })?;
        if cached {
            SEARCH_METRICS.autocomplete_cache_hits.inc();
        }

        Ok(AutocompleteResponse {
            suggestions: (*suggestions).clone(),
        })
    }

    pub fn stats(&self) -> SearchResult<IndexStats> {
        self.store.stats()
    }

    pub fn health(&self) -> HealthReport {
        let available = self.store.is_available();
        HealthReport {
            healthy: available,
            index_available: available,
            generation: self.store.generation(),
            cached_suggestions: self.suggestions.entry_count(),
        }
    }

    /// Drop tombstones older than `retention`
    pub fn purge_tombstones(&self, retention: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|r| Utc::now().checked_sub_signed(r))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.store.purge_tombstones(cutoff)
    }

    fn record_error(&self, operation: &str, err: &SearchError) {
        let kind = err.kind();
        SEARCH_METRICS
            .search_errors
            .with_label_values(&[kind.as_ref()])
            .inc();
        if kind.is_client_error() {
            debug!(operation, kind = %kind, error = %err, "Request rejected");
        } else {
            warn!(operation, kind = %kind, error = %err, "Request failed");
        }
    }
}

fn response(
    results: Vec<SearchHit>,
    facets: Vec<FacetResult>,
    total: usize,
    plan: &QueryPlan,
    started: Instant,
) -> SearchResponse {
    SearchResponse {
        results,
        facets,
        total,
        page: plan.page,
        page_size: plan.page_size,
        took_ms: started.elapsed().as_millis() as u64,
    }
}
