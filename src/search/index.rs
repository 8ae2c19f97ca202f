//! Partitioned in-memory inverted index
//!
//! Documents live in partitions keyed by entity type and scope (global,
//! public, or one tenant). Each partition holds its documents, the postings
//! for their tokens and the autocomplete term counts behind a single
//! `RwLock`, so postings and suggestions are always mutated together.
//!
//! A directory maps every document key to its current location and version.
//! Writers lock the directory slot of their key first and then the partition
//! locks they need in key order; readers take one partition read lock at a
//! time and never touch the directory. Every acquisition is bounded by the
//! configured lock timeout.

use crate::search::autocomplete::AutocompleteIndex;
use crate::search::document::{normalize_tenant, Document, DocumentKey, EntityType, Visibility};
use crate::search::error::{SearchError, SearchResult};
use crate::search::metrics::SEARCH_METRICS;
use crate::search::query::{MatchMode, QueryPlan};
use crate::search::tokenizer::Tokenizer;
use crate::search::visibility::TenantScope;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Visibility class of a partition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionScope {
    /// Documents without a tenant
    Global,
    /// Approved, publicly listed tenant documents
    Public,
    /// Private documents of one tenant
    Tenant(String),
}

impl PartitionScope {
    pub fn for_document(doc: &Document) -> Self {
        match normalize_tenant(doc.tenant_id.clone()) {
            None => PartitionScope::Global,
            Some(_) if doc.visibility == Visibility::Public => PartitionScope::Public,
            Some(tenant) => PartitionScope::Tenant(tenant),
        }
    }
}

/// Partition identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    pub entity_type: EntityType,
    pub scope: PartitionScope,
}

impl PartitionKey {
    pub fn for_document(doc: &Document) -> Self {
        Self {
            entity_type: doc.entity_type,
            scope: PartitionScope::for_document(doc),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            PartitionScope::Global => write!(f, "{}/global", self.entity_type),
            PartitionScope::Public => write!(f, "{}/public", self.entity_type),
            PartitionScope::Tenant(tenant) => write!(f, "{}/tenant:{}", self.entity_type, tenant),
        }
    }
}

/// Per-document term frequencies for one token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub title_tf: u32,
    pub description_tf: u32,
    /// Occurrences in keywords and searchable fields
    pub other_tf: u32,
}

impl Posting {
    pub fn is_empty(&self) -> bool {
        self.title_tf == 0 && self.description_tf == 0 && self.other_tf == 0
    }
}

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Older than the stored version or a newer-or-equal tombstone
    StaleWriteIgnored,
}

/// Result of a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeleteOutcome {
    Removed,
    AlreadyAbsent,
    /// Older than the stored version
    StaleWriteIgnored,
}

/// Where a key currently lives, or when it was deleted
#[derive(Debug, Clone, PartialEq)]
enum DirectoryEntry {
    Live {
        partition: PartitionKey,
        version: DateTime<Utc>,
    },
    Tombstone {
        version: DateTime<Utc>,
    },
}

type DirectorySlot = Arc<Mutex<Option<DirectoryEntry>>>;

/// Tokens of a document, computed before any lock is taken
struct AnalyzedDocument {
    document: Arc<Document>,
    postings: HashMap<String, Posting>,
    suggest_terms: Vec<String>,
}

struct IndexedDocument {
    document: Arc<Document>,
    terms: Vec<String>,
    suggest_terms: Vec<String>,
}

#[derive(Default)]
struct Partition {
    documents: HashMap<DocumentKey, IndexedDocument>,
    postings: HashMap<String, HashMap<DocumentKey, Posting>>,
    suggestions: AutocompleteIndex,
}

impl Partition {
    fn insert(&mut self, key: DocumentKey, analyzed: AnalyzedDocument) {
        self.remove(&key);

        let mut terms = Vec::with_capacity(analyzed.postings.len());
        for (term, posting) in analyzed.postings {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(key.clone(), posting);
            terms.push(term);
        }
        self.suggestions.add(&analyzed.suggest_terms);
        self.documents.insert(
            key,
            IndexedDocument {
                document: analyzed.document,
                terms,
                suggest_terms: analyzed.suggest_terms,
            },
        );
    }

    fn remove(&mut self, key: &DocumentKey) -> Option<IndexedDocument> {
        let indexed = self.documents.remove(key)?;
        for term in &indexed.terms {
            if let Some(list) = self.postings.get_mut(term) {
                list.remove(key);
                if list.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        self.suggestions.remove(&indexed.suggest_terms);
        Some(indexed)
    }

    /// Keys matching the tokens under the match mode
    fn matching_keys(&self, tokens: &[String], mode: MatchMode) -> Vec<&DocumentKey> {
        let lists: Vec<Option<&HashMap<DocumentKey, Posting>>> =
            tokens.iter().map(|t| self.postings.get(t)).collect();

        match mode {
            MatchMode::All => {
                if lists.iter().any(Option::is_none) {
                    return Vec::new();
                }
                let mut present: Vec<&HashMap<DocumentKey, Posting>> =
                    lists.into_iter().flatten().collect();
                // Drive the intersection from the rarest token
                present.sort_by_key(|list| list.len());
                let Some((rarest, rest)) = present.split_first() else {
                    return Vec::new();
                };
                rarest
                    .keys()
                    .filter(|key| rest.iter().all(|list| list.contains_key(*key)))
                    .collect()
            }
            MatchMode::Any => {
                let mut seen: HashSet<&DocumentKey> = HashSet::new();
                lists
                    .into_iter()
                    .flatten()
                    .flat_map(|list| list.keys())
                    .filter(|key| seen.insert(*key))
                    .collect()
            }
        }
    }
}

/// A matched document with its postings, aligned with [`CandidateSet::tokens`]
#[derive(Debug, Clone)]
pub struct Candidate {
    pub document: Arc<Document>,
    pub postings: Vec<Posting>,
}

/// Matched documents plus the token statistics of the scanned partitions
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub tokens: Vec<String>,
    /// Documents containing each token, over scanned partitions only
    pub document_frequency: Vec<usize>,
    /// Documents in the scanned partitions
    pub universe: usize,
    pub candidates: Vec<Candidate>,
}

impl CandidateSet {
    /// Inverse partition frequency of the token at `index`
    pub fn ipf(&self, index: usize) -> f64 {
        match self.document_frequency.get(index) {
            Some(df) if *df > 0 => (1.0 + self.universe as f64 / *df as f64).ln(),
            _ => 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Index statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub documents: usize,
    pub partitions: usize,
    /// Distinct tokens across all partitions
    pub terms: usize,
    pub tombstones: usize,
    pub generation: u64,
    pub available: bool,
}

/// Partitioned inverted index with per-document write serialization
pub struct IndexStore {
    directory: DashMap<DocumentKey, DirectorySlot>,
    partitions: DashMap<PartitionKey, Arc<RwLock<Partition>>>,
    tokenizer: Tokenizer,
    lock_timeout: Duration,
    available: AtomicBool,
    generation: AtomicU64,
}

impl IndexStore {
    pub fn new(tokenizer: Tokenizer, lock_timeout: Duration) -> Self {
        Self {
            directory: DashMap::new(),
            partitions: DashMap::new(),
            tokenizer,
            lock_timeout,
            available: AtomicBool::new(true),
            generation: AtomicU64::new(0),
        }
    }

    /// Take the store offline or bring it back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if available {
            info!("Index store is available");
        } else {
            warn!("Index store marked unavailable");
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Bumped by every applied mutation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> SearchResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(SearchError::IndexUnavailable("index store is offline".to_string()))
        }
    }

    /// Insert or replace a document; older versions are ignored
    pub fn upsert(&self, mut document: Document) -> SearchResult<UpsertOutcome> {
        self.ensure_available()?;
        document.tenant_id = normalize_tenant(document.tenant_id.take());
        document.validate()?;

        let key = document.key();
        let version = document.updated_at;
        let target = PartitionKey::for_document(&document);
        let analyzed = self.analyze(document);

        let slot = self.slot(&key);
        let mut entry = self.lock_slot(&key, &slot)?;

        let previous = match entry.as_ref() {
            Some(DirectoryEntry::Live {
                partition,
                version: current,
            }) => {
                if version < *current {
                    return Ok(self.stale_upsert(&key, version, *current));
                }
                Some(partition.clone())
            }
            Some(DirectoryEntry::Tombstone { version: deleted }) if version <= *deleted => {
                return Ok(self.stale_upsert(&key, version, *deleted));
            }
            _ => None,
        };

        match &previous {
            Some(source) if *source != target => {
                let source_lock = self.partition(source);
                let target_lock = self.partition(&target);
                let (mut source_guard, mut target_guard) = if *source < target {
                    let s = self.write(source, &source_lock)?;
                    let t = self.write(&target, &target_lock)?;
                    (s, t)
                } else {
                    let t = self.write(&target, &target_lock)?;
                    let s = self.write(source, &source_lock)?;
                    (s, t)
                };
                source_guard.remove(&key);
                target_guard.insert(key.clone(), analyzed);
                debug!(document = %key, from = %source, to = %target, "Document moved between partitions");
            }
            _ => {
                let target_lock = self.partition(&target);
                let mut guard = self.write(&target, &target_lock)?;
                guard.insert(key.clone(), analyzed);
            }
        }

        *entry = Some(DirectoryEntry::Live {
            partition: target,
            version,
        });
        self.generation.fetch_add(1, Ordering::SeqCst);

        let outcome = if previous.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        };
        SEARCH_METRICS
            .index_mutations
            .with_label_values(&[key.entity_type.as_ref(), outcome.as_ref()])
            .inc();
        debug!(document = %key, outcome = %outcome, "Document indexed");
        Ok(outcome)
    }

    fn stale_upsert(
        &self,
        key: &DocumentKey,
        incoming: DateTime<Utc>,
        stored: DateTime<Utc>,
    ) -> UpsertOutcome {
        let outcome = UpsertOutcome::StaleWriteIgnored;
        SEARCH_METRICS
            .index_mutations
            .with_label_values(&[key.entity_type.as_ref(), outcome.as_ref()])
            .inc();
        debug!(
            document = %key,
            incoming = %incoming,
            stored = %stored,
            "Stale upsert ignored"
        );
        outcome
    }

    /// Remove a document, leaving a tombstone at `deleted_at`
    pub fn delete(&self, key: &DocumentKey, deleted_at: DateTime<Utc>) -> SearchResult<DeleteOutcome> {
        self.ensure_available()?;
        let key = DocumentKey::new(key.tenant_id.as_deref(), key.entity_type, key.id.clone());

        let slot = self.slot(&key);
        let mut entry = self.lock_slot(&key, &slot)?;

        let outcome = match entry.clone() {
            Some(DirectoryEntry::Live { version, .. }) if deleted_at < version => {
                DeleteOutcome::StaleWriteIgnored
            }
            Some(DirectoryEntry::Live { partition, .. }) => {
                let lock = self.partition(&partition);
                let mut guard = self.write(&partition, &lock)?;
                guard.remove(&key);
                drop(guard);

                *entry = Some(DirectoryEntry::Tombstone { version: deleted_at });
                self.generation.fetch_add(1, Ordering::SeqCst);
                DeleteOutcome::Removed
            }
            Some(DirectoryEntry::Tombstone { version }) => {
                if deleted_at > version {
                    *entry = Some(DirectoryEntry::Tombstone { version: deleted_at });
                }
                DeleteOutcome::AlreadyAbsent
            }
            None => {
                // Remember the delete so a late upsert cannot resurrect the key
                *entry = Some(DirectoryEntry::Tombstone { version: deleted_at });
                DeleteOutcome::AlreadyAbsent
            }
        };

        SEARCH_METRICS
            .index_mutations
            .with_label_values(&[key.entity_type.as_ref(), outcome.as_ref()])
            .inc();
        debug!(document = %key, outcome = %outcome, "Delete applied");
        Ok(outcome)
    }

    /// Current stored document for a key
    pub fn get(&self, key: &DocumentKey) -> SearchResult<Option<Arc<Document>>> {
        self.ensure_available()?;
        let Some(slot) = self.directory.get(key).map(|s| Arc::clone(s.value())) else {
            return Ok(None);
        };
        let partition = match &*self.lock_slot(key, &slot)? {
            Some(DirectoryEntry::Live { partition, .. }) => partition.clone(),
            _ => return Ok(None),
        };
        let lock = self.partition(&partition);
        let guard = self.read(&partition, &lock)?;
        Ok(guard.documents.get(key).map(|d| Arc::clone(&d.document)))
    }

    /// Find candidates for a plan in the partitions the caller may read
    pub fn lookup(&self, plan: &QueryPlan) -> SearchResult<CandidateSet> {
        self.ensure_available()?;
        let targets = self.visible_partitions(&plan.types, plan.view.scope());

        let mut set = CandidateSet {
            tokens: plan.tokens.clone(),
            document_frequency: vec![0; plan.tokens.len()],
            universe: 0,
            candidates: Vec::new(),
        };

        for (key, lock) in &targets {
            let partition = self.read(key, lock)?;
            set.universe += partition.documents.len();
            for (i, token) in plan.tokens.iter().enumerate() {
                set.document_frequency[i] += partition.postings.get(token).map_or(0, |l| l.len());
            }

            for doc_key in partition.matching_keys(&plan.tokens, plan.match_mode) {
                let Some(indexed) = partition.documents.get(doc_key) else {
                    continue;
                };
                if !plan.matches_filters(&indexed.document) {
                    continue;
                }
                let postings = plan
                    .tokens
                    .iter()
                    .map(|t| {
                        partition
                            .postings
                            .get(t)
                            .and_then(|l| l.get(doc_key))
                            .copied()
                            .unwrap_or_default()
                    })
                    .collect();
                set.candidates.push(Candidate {
                    document: Arc::clone(&indexed.document),
                    postings,
                });
            }
        }

        debug!(
            partitions = targets.len(),
            universe = set.universe,
            candidates = set.candidates.len(),
            "Lookup complete"
        );
        Ok(set)
    }

    /// Merged autocomplete term counts for a prefix across visible partitions
    pub fn suggest(
        &self,
        types: &[EntityType],
        scope: &TenantScope,
        prefix: &str,
    ) -> SearchResult<HashMap<String, usize>> {
        self.ensure_available()?;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for (key, lock) in self.visible_partitions(types, scope) {
            let partition = self.read(&key, &lock)?;
            for (term, count) in partition.suggestions.with_prefix(prefix) {
                *counts.entry(term.clone()).or_insert(0) += count;
            }
        }
        Ok(counts)
    }

    /// Drop tombstones older than the cutoff; returns how many were dropped
    pub fn purge_tombstones(&self, older_than: DateTime<Utc>) -> usize {
        let before = self.directory.len();
        self.directory.retain(|_, slot| {
            // Slots cloned by an in-flight writer are kept
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Some(entry) => !matches!(
                    *entry,
                    Some(DirectoryEntry::Tombstone { version }) if version < older_than
                ),
                None => true,
            }
        });
        let purged = before.saturating_sub(self.directory.len());
        if purged > 0 {
            info!(purged, "Purged tombstones");
        }
        purged
    }

    pub fn stats(&self) -> SearchResult<IndexStats> {
        let mut stats = IndexStats {
            generation: self.generation(),
            available: self.is_available(),
            ..IndexStats::default()
        };

        let mut terms: HashSet<String> = HashSet::new();
        let partitions: Vec<(PartitionKey, Arc<RwLock<Partition>>)> = self
            .partitions
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        for (key, lock) in &partitions {
            let partition = self.read(key, lock)?;
            if partition.documents.is_empty() {
                continue;
            }
            stats.partitions += 1;
            stats.documents += partition.documents.len();
            terms.extend(partition.postings.keys().cloned());
        }
        stats.terms = terms.len();

        let slots: Vec<(DocumentKey, DirectorySlot)> = self
            .directory
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        for (key, slot) in &slots {
            if matches!(*self.lock_slot(key, slot)?, Some(DirectoryEntry::Tombstone { .. })) {
                stats.tombstones += 1;
            }
        }
        Ok(stats)
    }

    fn analyze(&self, document: Document) -> AnalyzedDocument {
        let mut postings: HashMap<String, Posting> = HashMap::new();
        let mut suggest_terms: BTreeSet<String> = BTreeSet::new();

        for token in self.tokenizer.tokenize(&document.title) {
            suggest_terms.insert(token.clone());
            postings.entry(token).or_default().title_tf += 1;
        }
        for token in self.tokenizer.tokenize(&document.description) {
            postings.entry(token).or_default().description_tf += 1;
        }
        for keyword in &document.keywords {
            for token in self.tokenizer.tokenize(keyword) {
                suggest_terms.insert(token.clone());
                postings.entry(token).or_default().other_tf += 1;
            }
        }

        AnalyzedDocument {
            document: Arc::new(document),
            postings,
            suggest_terms: suggest_terms.into_iter().collect(),
        }
    }

    fn visible_partitions(
        &self,
        types: &[EntityType],
        scope: &TenantScope,
    ) -> Vec<(PartitionKey, Arc<RwLock<Partition>>)> {
        let mut targets: Vec<(PartitionKey, Arc<RwLock<Partition>>)> = self
            .partitions
            .iter()
            .filter(|e| types.contains(&e.key().entity_type) && scope.admits_partition(&e.key().scope))
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        targets.sort_by(|a, b| a.0.cmp(&b.0));
        targets
    }

    fn slot(&self, key: &DocumentKey) -> DirectorySlot {
        if let Some(slot) = self.directory.get(key) {
            return Arc::clone(slot.value());
        }
        Arc::clone(self.directory.entry(key.clone()).or_default().value())
    }

    fn partition(&self, key: &PartitionKey) -> Arc<RwLock<Partition>> {
        if let Some(partition) = self.partitions.get(key) {
            return Arc::clone(partition.value());
        }
        Arc::clone(self.partitions.entry(key.clone()).or_default().value())
    }

    fn lock_slot<'a>(
        &self,
        key: &DocumentKey,
        slot: &'a DirectorySlot,
    ) -> SearchResult<parking_lot::MutexGuard<'a, Option<DirectoryEntry>>> {
        slot.try_lock_for(self.lock_timeout).ok_or_else(|| {
            warn!(document = %key, "Timed out waiting for document lock");
            SearchError::IndexUnavailable(format!("document {} is locked", key))
        })
    }

    fn read<'a>(
        &self,
        key: &PartitionKey,
        lock: &'a RwLock<Partition>,
    ) -> SearchResult<RwLockReadGuard<'a, Partition>> {
        lock.try_read_for(self.lock_timeout).ok_or_else(|| {
            warn!(partition = %key, "Timed out waiting for partition read lock");
            SearchError::IndexUnavailable(format!("partition {} is busy", key))
        })
    }

    fn write<'a>(
        &self,
        key: &PartitionKey,
        lock: &'a RwLock<Partition>,
    ) -> SearchResult<RwLockWriteGuard<'a, Partition>> {
        lock.try_write_for(self.lock_timeout).ok_or_else(|| {
            warn!(partition = %key, "Timed out waiting for partition write lock");
            SearchError::IndexUnavailable(format!("partition {} is busy", key))
        })
    }
}

impl fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexStore")
            .field("keys", &self.directory.len())
            .field("partitions", &self.partitions.len())
            .field("generation", &self.generation())
            .field("available", &self.is_available())
            .finish()
    }
}
