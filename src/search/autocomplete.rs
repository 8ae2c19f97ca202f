//! Prefix index over title tokens and keywords
//!
//! Each index partition owns one [`AutocompleteIndex`] and mutates it under
//! the same write lock as its postings. Lookups merge term counts across the
//! partitions a caller may read, then rank them here.

use crate::search::document::EntityType;
use moka::sync::Cache;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

/// Term → number of documents in the partition containing it
#[derive(Debug, Clone, Default)]
pub struct AutocompleteIndex {
    terms: BTreeMap<String, usize>,
}

impl AutocompleteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more document for each term
    pub fn add<'a>(&mut self, terms: impl IntoIterator<Item = &'a String>) {
        for term in terms {
            *self.terms.entry(term.clone()).or_insert(0) += 1;
        }
    }

    /// Count one fewer document for each term, dropping terms that reach zero
    pub fn remove<'a>(&mut self, terms: impl IntoIterator<Item = &'a String>) {
        for term in terms {
            if let Some(count) = self.terms.get_mut(term) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.terms.remove(term);
                }
            }
        }
    }

    /// Terms starting with `prefix`, in lexical order
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a String, usize)> + 'a {
        self.terms
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(term, _)| term.starts_with(prefix))
            .map(|(term, count)| (term, *count))
    }

    pub fn count(&self, term: &str) -> usize {
        self.terms.get(term).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Order merged term counts by document count desc, then alphabetically
pub fn rank_terms(counts: HashMap<String, usize>, limit: usize) -> Vec<String> {
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(term, _)| term).collect()
}

/// Everything an autocomplete answer depends on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SuggestionKey {
    /// Index generation the answer was computed at
    pub generation: u64,
    pub scope: String,
    pub types: Vec<EntityType>,
    pub query: String,
    pub limit: usize,
}

/// Bounded cache of autocomplete answers
///
/// Keys carry the index generation, so any mutation makes older entries
/// unreachable; they age out through TTL and capacity eviction.
#[derive(Clone)]
pub struct SuggestionCache {
    cache: Cache<SuggestionKey, Arc<Vec<String>>>,
}

impl SuggestionCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    /// Try the cache first, else compute and remember the answer
    ///
    /// Returns the suggestions and whether they came from the cache.
    pub fn get_or_compute<E>(
        &self,
        key: SuggestionKey,
        compute: impl FnOnce() -> Result<Vec<String>, E>,
    ) -> Result<(Arc<Vec<String>>, bool), E> {
        if let Some(hit) = self.cache.get(&key) {
            return Ok((hit, true));
        }
        let computed = Arc::new(compute()?);
        self.cache.insert(key, computed.clone());
        Ok((computed, false))
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl std::fmt::Debug for SuggestionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuggestionCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_counts_documents_per_term() {
        let mut index = AutocompleteIndex::new();
        index.add(&terms(&["brake", "pad"]));
        index.add(&terms(&["brake", "disc"]));
        assert_eq!(index.count("brake"), 2);

        index.remove(&terms(&["brake", "pad"]));
        assert_eq!(index.count("brake"), 1);
        assert_eq!(index.count("pad"), 0);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_prefix_range() {
        let mut index = AutocompleteIndex::new();
        index.add(&terms(&["brake", "bracket", "bolt", "cable"]));
        let found: Vec<&String> = index.with_prefix("br").map(|(t, _)| t).collect();
        assert_eq!(found, vec!["bracket", "brake"]);
        assert_eq!(index.with_prefix("z").count(), 0);
    }

    #[test]
    fn test_rank_terms() {
        let counts: HashMap<String, usize> = [("brake", 3), ("bracket", 1), ("brass", 3)]
            .into_iter()
            .map(|(t, c)| (t.to_string(), c))
            .collect();
        assert_eq!(rank_terms(counts.clone(), 10), vec!["brake", "brass", "bracket"]);
        assert_eq!(rank_terms(counts, 1), vec!["brake"]);
    }

    #[test]
    fn test_cache_try_then_recompute() {
        let cache = SuggestionCache::new(16, Duration::from_secs(60));
        let key = SuggestionKey {
            generation: 1,
            scope: "public".to_string(),
            types: vec![EntityType::Part],
            query: "br".to_string(),
            limit: 10,
        };

        let (first, cached) = cache
            .get_or_compute::<()>(key.clone(), || Ok(vec!["brake".to_string()]))
            .unwrap();
        assert!(!cached);
        assert_eq!(*first, vec!["brake"]);

        let (second, cached) = cache
            .get_or_compute::<()>(key, || panic!("must not recompute"))
            .unwrap();
        assert!(cached);
        assert_eq!(*second, vec!["brake"]);
    }
}
