//! Unified multi-entity search
//!
//! One free-text query is resolved across parts, equipment, companies,
//! marketplace listings and services, each owned by a tenant. Results are
//! ranked with a deterministic relevance function, faceted over the full
//! match set and filtered by caller identity before they leave the engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │           Search Coordinator                     │
//! ├─────────────────────────────────────────────────┤
//! │  - search()          - autocomplete()           │
//! │  - apply_change()    - index_document()         │
//! │  - remove_document() - stats() / health()       │
//! └─────────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────────┐
//! │  Query Planner → Ranking → Facets → Visibility   │
//! ├─────────────────────────────────────────────────┤
//! │  - Tokenization, type/filter/sort validation    │
//! │  - Weighted term scoring, numeric sorts         │
//! │  - Caller scope, sensitive field redaction      │
//! └─────────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────────┐
//! │              Index Store                         │
//! ├─────────────────────────────────────────────────┤
//! │  - Partitions per (type, global|public|tenant)  │
//! │  - Postings + autocomplete terms per partition  │
//! │  - Versioned directory with tombstones          │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use unified_search::search::{
//!     AccessPolicy, CallerContext, Document, EntityType, SearchConfig, SearchCoordinator,
//!     SearchRequest,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let search = SearchCoordinator::new(SearchConfig::default(), AccessPolicy::default());
//!
//!     search.index_document(
//!         Document::new(EntityType::Part, "p-1", "Brake Pad").with_facet("category", "brakes"),
//!     )?;
//!
//!     let request = SearchRequest::new("brake pad").with_type("part").with_page_size(20);
//!     let response = search.search(request, CallerContext::guest()).await?;
//!     println!("Found {} documents", response.total);
//!
//!     Ok(())
//! }
//! ```

mod autocomplete;
mod config;
mod document;
mod error;
mod facets;
mod index;
pub mod metrics;
mod policy;
mod query;
mod ranking;
pub mod schema;
mod service;
pub mod tokenizer;
mod visibility;

pub use autocomplete::{AutocompleteIndex, SuggestionCache, SuggestionKey};
pub use config::{RankingWeights, SearchConfig, SearchConfigBuilder};
pub use document::{
    Document, DocumentKey, EntityType, FieldValue, Visibility, PRICE_DISPLAY_FIELD, PRICE_FIELD,
    PRICE_RESTRICTED_FIELD,
};
pub use error::{ErrorKind, SearchError, SearchResult};
pub use facets::{FacetAggregator, FacetBucket, FacetResult, TYPE_FACET};
pub use index::{
    Candidate, CandidateSet, DeleteOutcome, IndexStats, IndexStore, PartitionKey, PartitionScope,
    Posting, UpsertOutcome,
};
pub use policy::{AccessPolicy, Permission, RoleGrant, READ_SENSITIVE};
pub use query::{FieldFilter, MatchMode, QueryPlan, QueryPlanner, SearchRequest, SortMode};
pub use ranking::{RankingEngine, ScoredDocument};
pub use schema::{EntitySchema, FacetDomain, FieldKind, FieldSpec, SchemaRegistry};
pub use service::{
    AutocompleteRequest, AutocompleteResponse, Deadline, HealthReport, SearchCoordinator,
    SearchResponse,
};
pub use tokenizer::Tokenizer;
pub use visibility::{
    AccessView, CallerContext, CallerState, SearchHit, TenantScope, VisibilityFilter,
};
