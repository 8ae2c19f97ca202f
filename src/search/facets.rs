//! Facet counts over the full match set
//!
//! Facets are computed before pagination. Every matched document lands in
//! exactly one bucket or in `other` for each facet, so bucket counts plus
//! `other` always equal the total match count.

use crate::search::document::{Document, EntityType};
use crate::search::query::QueryPlan;
use crate::search::ranking::ScoredDocument;
use crate::search::schema::{FacetDomain, SchemaRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Name of the entity type facet
pub const TYPE_FACET: &str = "type";

/// Count of documents sharing one facet value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetBucket {
    pub value: String,
    pub count: usize,
}

/// Counts for one facet field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetResult {
    pub field: String,

    /// Count desc, then value asc
    pub buckets: Vec<FacetBucket>,

    /// Documents whose value is missing, outside the domain, or hidden from the caller
    pub other: usize,
}

impl FacetResult {
    /// Sum of bucket counts and `other`
    pub fn total(&self) -> usize {
        self.buckets.iter().map(|b| b.count).sum::<usize>() + self.other
    }

    pub fn count(&self, value: &str) -> usize {
        self.buckets
            .iter()
            .find(|b| b.value == value)
            .map(|b| b.count)
            .unwrap_or(0)
    }
}

/// Computes facet results for ranked documents
#[derive(Debug, Clone)]
pub struct FacetAggregator {
    schemas: Arc<SchemaRegistry>,
}

impl FacetAggregator {
    pub fn new(schemas: Arc<SchemaRegistry>) -> Self {
        Self { schemas }
    }

    /// `type` plus every facet field the requested types declare
    pub fn aggregate(&self, matched: &[ScoredDocument], plan: &QueryPlan) -> Vec<FacetResult> {
        let mut results = Vec::new();

        let type_domain = FacetDomain::Values(plan.types.iter().map(|t| t.to_string()).collect());
        results.push(self.count(TYPE_FACET, &type_domain, matched, |doc| {
            Some(doc.entity_type.to_string())
        }));

        for (field, domain) in self.schemas.facet_fields(&plan.types) {
            let result = self.count(&field, &domain, matched, |doc| {
                if !self.declared(doc.entity_type, &field) {
                    return None;
                }
                plan.view
                    .visible_value(doc, &field)
                    .and_then(|value| value.facet_value())
            });
            results.push(result);
        }
        results
    }

    fn declared(&self, entity_type: EntityType, field: &str) -> bool {
        self.schemas
            .schema(entity_type)
            .map(|s| s.declares(field))
            .unwrap_or(false)
    }

    fn count(
        &self,
        field: &str,
        domain: &FacetDomain,
        matched: &[ScoredDocument],
        value_of: impl Fn(&Document) -> Option<String>,
    ) -> FacetResult {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut other = 0;

        for scored in matched {
            match value_of(&scored.document) {
                Some(value) if domain.admits(&value) => *counts.entry(value).or_insert(0) += 1,
                _ => other += 1,
            }
        }

        let mut buckets: Vec<FacetBucket> = counts
            .into_iter()
            .map(|(value, count)| FacetBucket { value, count })
            .collect();
        buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));

        FacetResult {
            field: field.to_string(),
            buckets,
            other,
        }
    }
}
