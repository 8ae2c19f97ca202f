//! Search requests and query planning

use crate::search::config::SearchConfig;
use crate::search::document::{Document, EntityType};
use crate::search::error::{SearchError, SearchResult};
use crate::search::policy::AccessPolicy;
use crate::search::schema::SchemaRegistry;
use crate::search::tokenizer::Tokenizer;
use crate::search::visibility::{AccessView, CallerContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

/// Result ordering
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SortMode {
    #[default]
    Relevance,
    /// Highest rating first
    Rating,
    /// Cheapest first
    Price,
    /// Soonest delivery first
    Eta,
}

impl SortMode {
    /// Numeric field the mode orders by
    pub fn field(&self) -> Option<&'static str> {
        match self {
            SortMode::Relevance => None,
            SortMode::Rating => Some("rating"),
            SortMode::Price => Some("price"),
            SortMode::Eta => Some("eta"),
        }
    }

    pub fn is_descending(&self) -> bool {
        matches!(self, SortMode::Rating)
    }
}

/// How query tokens combine
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum MatchMode {
    /// Every token must match
    #[default]
    All,
    /// At least one token must match
    Any,
}

/// Equality filter on a declared field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
}

/// Search request as received from a caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query
    pub query: String,

    /// `all`, empty, or one entity type
    #[serde(rename = "type", default)]
    pub entity_type: Option<String>,

    /// Conjunctive field equality filters
    #[serde(default)]
    pub filters: BTreeMap<String, String>,

    /// `relevance`, `rating`, `price` or `eta`
    #[serde(default)]
    pub sort: Option<String>,

    #[serde(default)]
    pub match_mode: Option<MatchMode>,

    /// 1-based page number
    #[serde(default)]
    pub page: Option<i64>,

    #[serde(default)]
    pub page_size: Option<i64>,
}

impl SearchRequest {
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

    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = Some(mode);
        self
    }

    pub fn with_page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

/// Validated, normalized form of a request; lives for one request only
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// Distinct query tokens in query order
    pub tokens: Vec<String>,

    /// Lower-cased, whitespace-collapsed query for exact title matching
    pub normalized_query: String,

    pub types: Vec<EntityType>,
    pub filters: Vec<FieldFilter>,
    pub sort: SortMode,
    pub match_mode: MatchMode,
    pub page: usize,
    pub page_size: usize,
    pub view: AccessView,
}

impl QueryPlan {
    /// Index of the first result on the page
    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.page_size)
    }

    /// All filters match the values this caller can see
    pub fn matches_filters(&self, doc: &Document) -> bool {
        self.filters.iter().all(|filter| {
            self.view
                .visible_value(doc, &filter.field)
                .map(|value| value.matches_filter(&filter.value))
                .unwrap_or(false)
        })
    }
}

/// Normalize free text the way titles are compared
pub fn normalize_phrase(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Turns requests into plans
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    tokenizer: Tokenizer,
    schemas: Arc<SchemaRegistry>,
    policy: Arc<AccessPolicy>,
    config: SearchConfig,
}

impl QueryPlanner {
    pub fn new(
        tokenizer: Tokenizer,
        schemas: Arc<SchemaRegistry>,
        policy: Arc<AccessPolicy>,
        config: SearchConfig,
    ) -> Self {
        Self {
            tokenizer,
            schemas,
            policy,
            config,
        }
    }

    /// Validate and normalize a request for a caller
    pub fn plan(&self, request: &SearchRequest, caller: &CallerContext) -> SearchResult<QueryPlan> {
        let tokens = self.tokenizer.unique_tokens(&request.query);
        if tokens.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let types = EntityType::parse_filter(request.entity_type.as_deref())?;
        let sort = match request.sort.as_deref().map(str::trim) {
            None | Some("") => SortMode::default(),
            Some(raw) => {
                SortMode::from_str(raw).map_err(|_| SearchError::UnknownSortMode(raw.to_string()))?
            }
        };

        let view = AccessView::resolve(caller, &self.policy);
        let filters = self.validate_filters(request, &types, &view)?;
        let (page, page_size) = self.clamp_page(request.page, request.page_size);

        Ok(QueryPlan {
            tokens,
            normalized_query: normalize_phrase(&request.query),
            types,
            filters,
            sort,
            match_mode: request.match_mode.unwrap_or_default(),
            page,
            page_size,
            view,
        })
    }

    fn validate_filters(
        &self,
        request: &SearchRequest,
        types: &[EntityType],
        view: &AccessView,
    ) -> SearchResult<Vec<FieldFilter>> {
        let requested_type = request
            .entity_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("all");

        let mut filters = Vec::with_capacity(request.filters.len());
        for (field, value) in &request.filters {
            if !self.schemas.declares_any(types, field) {
                return Err(SearchError::UnknownFilterField {
                    entity_type: requested_type.to_lowercase(),
                    field: field.clone(),
                });
            }
            let restricted = types.iter().any(|t| {
                self.schemas.is_sensitive(*t, field) && !view.can_read_sensitive_type(*t)
            });
            if restricted {
                return Err(SearchError::RestrictedFilterField(field.clone()));
            }
            filters.push(FieldFilter {
                field: field.clone(),
                value: value.clone(),
            });
        }
        Ok(filters)
    }

    /// Page defaults to 1; page size defaults and clamps into `[1, max]`
    pub fn clamp_page(&self, page: Option<i64>, page_size: Option<i64>) -> (usize, usize) {
        let page = match page {
            Some(p) if p >= 1 => p as usize,
            _ => 1,
        };
        let page_size = match page_size {
            Some(s) if s >= 1 => (s as usize).min(self.config.max_page_size),
            _ => self.config.default_page_size,
        };
        (page, page_size)
    }
}
