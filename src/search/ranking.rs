//! Deterministic relevance scoring and result ordering
//!
//! Scoring is a pure function of the candidate set and the plan. Each token
//! contributes its inverse partition frequency times the weighted term
//! frequencies of the document's title, description and other fields; a
//! title equal to the whole query earns a fixed boost.

use crate::search::config::RankingWeights;
use crate::search::document::Document;
use crate::search::index::{Candidate, CandidateSet};
use crate::search::query::{normalize_phrase, QueryPlan};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::sync::Arc;

/// A matched document with its relevance score
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Arc<Document>,
    pub score: f64,
}

/// Scores and orders candidate sets
#[derive(Debug, Clone)]
pub struct RankingEngine {
    weights: RankingWeights,
    parallel_threshold: usize,
}

impl RankingEngine {
    pub fn new(weights: RankingWeights, parallel_threshold: usize) -> Self {
        Self {
            weights,
            parallel_threshold,
        }
    }

    /// Score and order every candidate according to the plan's sort mode
    pub fn rank(&self, set: CandidateSet, plan: &QueryPlan) -> Vec<ScoredDocument> {
        let ipf: Vec<f64> = (0..set.tokens.len()).map(|i| set.ipf(i)).collect();
        let score = |candidate: Candidate| ScoredDocument {
            score: self.score(&candidate, &ipf, &plan.normalized_query),
            document: candidate.document,
        };

        let mut scored: Vec<ScoredDocument> = if set.candidates.len() >= self.parallel_threshold {
            set.candidates.into_par_iter().map(score).collect()
        } else {
            set.candidates.into_iter().map(score).collect()
        };

        scored.sort_by(|a, b| match plan.sort.field() {
            None => by_relevance(a, b),
            Some(field) => by_field(a, b, field, plan).then_with(|| by_relevance(a, b)),
        });
        scored
    }

    /// Relevance score of one candidate
    pub fn score(&self, candidate: &Candidate, ipf: &[f64], normalized_query: &str) -> f64 {
        let w = &self.weights;
        let mut score: f64 = candidate
            .postings
            .iter()
            .zip(ipf)
            .map(|(posting, ipf)| {
                ipf * (w.title * posting.title_tf as f64
                    + w.description * posting.description_tf as f64
                    + w.other * posting.other_tf as f64)
            })
            .sum();

        if normalize_phrase(&candidate.document.title) == normalized_query {
            score += w.exact_title_boost;
        }
        score
    }
}

/// Score desc, then `updated_at` desc, then id, type and tenant asc
fn by_relevance(a: &ScoredDocument, b: &ScoredDocument) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.document.updated_at.cmp(&a.document.updated_at))
        .then_with(|| a.document.id.cmp(&b.document.id))
        .then_with(|| a.document.entity_type.cmp(&b.document.entity_type))
        .then_with(|| a.document.tenant_id.cmp(&b.document.tenant_id))
}

/// Order by a numeric field as the caller sees it; missing values sort last
fn by_field(a: &ScoredDocument, b: &ScoredDocument, field: &str, plan: &QueryPlan) -> Ordering {
    let value = |doc: &Document| {
        plan.view
            .visible_value(doc, field)
            .and_then(|v| v.as_f64())
            .filter(|v| !v.is_nan())
    };

    match (value(&a.document), value(&b.document)) {
        (Some(x), Some(y)) if plan.sort.is_descending() => y.total_cmp(&x),
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl Default for RankingEngine {
    fn default() -> Self {
        Self::new(RankingWeights::default(), 2_048)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::document::{EntityType, FieldValue, PRICE_FIELD, PRICE_RESTRICTED_FIELD};
    use crate::search::index::Posting;
    use crate::search::policy::AccessPolicy;
    use crate::search::query::{QueryPlanner, SearchRequest};
    use crate::search::schema::SchemaRegistry;
    use crate::search::tokenizer::Tokenizer;
    use crate::search::visibility::CallerContext;
    use crate::search::SearchConfig;
    use chrono::{TimeZone, Utc};

    fn plan(request: SearchRequest, caller: &CallerContext) -> QueryPlan {
        QueryPlanner::new(
            Tokenizer::new(),
            Arc::new(SchemaRegistry::standard()),
            Arc::new(AccessPolicy::default()),
            SearchConfig::default(),
        )
        .plan(&request, caller)
        .unwrap()
    }

    fn candidate(doc: Document, title_tf: u32, description_tf: u32) -> Candidate {
        Candidate {
            document: Arc::new(doc),
            postings: vec![Posting {
                title_tf,
                description_tf,
                other_tf: 0,
            }],
        }
    }

    fn set(candidates: Vec<Candidate>) -> CandidateSet {
        CandidateSet {
            tokens: vec!["brake".to_string()],
            document_frequency: vec![candidates.len()],
            universe: 10,
            candidates,
        }
    }

    fn listing(id: &str, price: Option<f64>) -> Document {
        let doc = Document::new(EntityType::Listing, id, "Brake kit");
        match price {
            Some(p) => doc.with_field(PRICE_FIELD, p),
            None => doc.with_field(PRICE_FIELD, FieldValue::Null),
        }
    }

    #[test]
    fn test_title_outweighs_description() {
        let engine = RankingEngine::default();
        let plan = plan(SearchRequest::new("brake"), &CallerContext::guest());
        let ranked = engine.rank(
            set(vec![
                candidate(Document::new(EntityType::Part, "d", "Caliper"), 0, 1),
                candidate(Document::new(EntityType::Part, "t", "Brake caliper"), 1, 0),
            ]),
            &plan,
        );
        assert_eq!(ranked[0].document.id, "t");
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_exact_title_boost() {
        let engine = RankingEngine::default();
        let plan = plan(SearchRequest::new("BRAKE"), &CallerContext::guest());
        let ranked = engine.rank(
            set(vec![
                candidate(Document::new(EntityType::Part, "a", "Brake pad"), 1, 0),
                candidate(Document::new(EntityType::Part, "b", "brake"), 1, 0),
            ]),
            &plan,
        );
        assert_eq!(ranked[0].document.id, "b");
        assert!((ranked[0].score - ranked[1].score - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_ties_break_on_updated_at_then_id() {
        let engine = RankingEngine::default();
        let plan = plan(SearchRequest::new("brake"), &CallerContext::guest());
        let older = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let newer = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
        let ranked = engine.rank(
            set(vec![
                candidate(Document::new(EntityType::Part, "c", "Brake Pad C").with_updated_at(older), 1, 0),
                candidate(Document::new(EntityType::Part, "b", "Brake Pad B").with_updated_at(older), 1, 0),
                candidate(Document::new(EntityType::Part, "a", "Brake Pad A").with_updated_at(newer), 1, 0),
            ]),
            &plan,
        );
        let ids: Vec<&str> = ranked.iter().map(|r| r.document.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_price_sort_missing_last() {
        let engine = RankingEngine::default();
        let plan = plan(SearchRequest::new("brake").with_sort("price"), &CallerContext::guest());
        let ranked = engine.rank(
            set(vec![
                candidate(listing("fifty", Some(50.0)), 1, 0),
                candidate(listing("none", None), 1, 0),
                candidate(listing("ten", Some(10.0)), 1, 0),
            ]),
            &plan,
        );
        let ids: Vec<&str> = ranked.iter().map(|r| r.document.id.as_str()).collect();
        assert_eq!(ids, vec!["ten", "fifty", "none"]);
    }

    #[test]
    fn test_rating_sort_descending_missing_last() {
        let engine = RankingEngine::default();
        let plan = plan(SearchRequest::new("brake").with_sort("rating"), &CallerContext::guest());
        let ranked = engine.rank(
            set(vec![
                candidate(Document::new(EntityType::Part, "low", "Brake").with_field("rating", 2.0), 1, 0),
                candidate(Document::new(EntityType::Part, "none", "Brake"), 1, 0),
                candidate(Document::new(EntityType::Part, "high", "Brake").with_field("rating", 4.5), 1, 0),
            ]),
            &plan,
        );
        let ids: Vec<&str> = ranked.iter().map(|r| r.document.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low", "none"]);
    }

    #[test]
    fn test_hidden_price_sorts_as_missing() {
        let engine = RankingEngine::default();
        let plan = plan(SearchRequest::new("brake").with_sort("price"), &CallerContext::guest());
        let hidden = listing("hidden", Some(1.0)).with_field(PRICE_RESTRICTED_FIELD, true);
        let ranked = engine.rank(
            set(vec![candidate(hidden, 1, 0), candidate(listing("shown", Some(99.0)), 1, 0)]),
            &plan,
        );
        assert_eq!(ranked[0].document.id, "shown");
    }

    #[test]
    fn test_parallel_scoring_matches_sequential() {
        let plan = plan(SearchRequest::new("brake"), &CallerContext::guest());
        let build = || {
            set((0..64)
                .map(|i| candidate(Document::new(EntityType::Part, format!("p{:02}", i), "Brake"), i % 3, i % 2))
                .collect())
        };
        let sequential = RankingEngine::new(RankingWeights::default(), usize::MAX).rank(build(), &plan);
        let parallel = RankingEngine::new(RankingWeights::default(), 1).rank(build(), &plan);
        let ids = |r: &[ScoredDocument]| r.iter().map(|d| d.document.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&sequential), ids(&parallel));
    }
}
