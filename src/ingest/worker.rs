//! Change-feed worker and throttled bulk reindex

use crate::ingest::config::IngestionConfig;
use crate::ingest::error::{IngestError, IngestResult};
use crate::ingest::event::ChangeEvent;
use crate::ingest::feed::ChangeFeed;
use crate::ingest::ApplyOutcome;
use crate::search::{DeleteOutcome, Document, SearchCoordinator, SearchError, UpsertOutcome};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Counters for one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
    /// Deletes of keys that were already absent
    pub absent: usize,
    pub stale: usize,
    /// Malformed or rejected events
    pub skipped: usize,
    pub retries: usize,
    /// Tombstones dropped after outliving the retention window
    pub purged: usize,
}

impl IngestStats {
    pub fn record(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Upserted(UpsertOutcome::Inserted) => self.inserted += 1,
            ApplyOutcome::Upserted(UpsertOutcome::Updated) => self.updated += 1,
            ApplyOutcome::Deleted(DeleteOutcome::Removed) => self.removed += 1,
            ApplyOutcome::Deleted(DeleteOutcome::AlreadyAbsent) => self.absent += 1,
            ApplyOutcome::Upserted(UpsertOutcome::StaleWriteIgnored)
            | ApplyOutcome::Deleted(DeleteOutcome::StaleWriteIgnored) => self.stale += 1,
        }
    }

    /// Events that changed or confirmed index state
    pub fn applied(&self) -> usize {
        self.inserted + self.updated + self.removed + self.absent + self.stale
    }
}

/// Drains a change feed into the index in delivery order
pub struct IngestionWorker {
    coordinator: SearchCoordinator,
    config: IngestionConfig,
}

impl IngestionWorker {
    pub fn new(coordinator: SearchCoordinator, config: IngestionConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    /// Apply every event until the feed is exhausted
    ///
    /// Malformed and rejected events are logged and skipped. Read failures
    /// and events that exhaust their retries stop the run. Tombstones past
    /// the retention window are purged every `purge_interval_events` events
    /// and once more when the feed is exhausted.
    pub async fn run<F: ChangeFeed + ?Sized>(&self, feed: &mut F) -> IngestResult<IngestStats> {
        let mut stats = IngestStats::default();
        let mut events = 0usize;
        info!(feed = feed.name(), "Ingestion started");

        loop {
            if self.config.purge_due(events) {
                self.purge(&mut stats);
            }
            let event = match feed.next_event().await {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(e) if e.is_skippable() => {
                    error!(feed = feed.name(), error = %e, "Skipping malformed change event");
                    stats.skipped += 1;
                    events += 1;
                    continue;
                }
                Err(e) => {
                    error!(feed = feed.name(), error = %e, "Change feed failed");
                    return Err(e);
                }
            };

            match self.apply_with_retry(&event, &mut stats).await {
                Ok(outcome) => stats.record(outcome),
                Err(e) if e.is_skippable() => {
                    error!(
                        event_id = %event.event_id,
                        document = %event.key(),
                        error = %e,
                        "Skipping rejected change event"
                    );
                    stats.skipped += 1;
                }
                Err(e) => return Err(e),
            }
            events += 1;
        }
        self.purge(&mut stats);

        info!(
            feed = feed.name(),
            applied = stats.applied(),
            skipped = stats.skipped,
            stale = stats.stale,
            purged = stats.purged,
            "Ingestion finished"
        );
        Ok(stats)
    }

    fn purge(&self, stats: &mut IngestStats) {
        let purged = self
            .coordinator
            .purge_tombstones(self.config.tombstone_retention());
        if purged > 0 {
            debug!(purged, "Tombstones purged during ingestion");
        }
        stats.purged += purged;
    }

    /// Apply one event, retrying while the index is unavailable
    pub async fn apply_with_retry(
        &self,
        event: &ChangeEvent,
        stats: &mut IngestStats,
    ) -> IngestResult<ApplyOutcome> {
        let mut attempt = 0;
        loop {
            let err = match self.coordinator.apply_change(event) {
                Ok(outcome) => {
                    debug!(event_id = %event.event_id, ?outcome, "Change event applied");
                    return Ok(outcome);
                }
                Err(e) if e.kind().is_retryable() => e,
                Err(e) => return Err(IngestError::Rejected(e)),
            };

            if attempt >= self.config.max_retries {
                return Err(IngestError::RetriesExhausted {
                    event_id: event.event_id.to_string(),
                    attempts: attempt + 1,
                    reason: err.to_string(),
                });
            }
            attempt += 1;
            stats.retries += 1;
            let delay = self.config.backoff(attempt);
            warn!(
                event_id = %event.event_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Index unavailable, retrying change event"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Separate batch path for rebuilding the index from a full snapshot
pub struct BulkReindexer {
    coordinator: SearchCoordinator,
    config: IngestionConfig,
}

impl BulkReindexer {
    pub fn new(coordinator: SearchCoordinator, config: IngestionConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    /// Index documents in batches, pausing between batches
    ///
    /// Invalid documents are skipped. An unavailable index aborts the run.
    pub async fn reindex<I>(&self, documents: I) -> IngestResult<IngestStats>
    where
        I: IntoIterator<Item = Document>,
    {
        let batch_size = self.config.batch_size.max(1);
        let mut stats = IngestStats::default();
        let mut documents = documents.into_iter().peekable();
        let mut batch_number = 0usize;

        while documents.peek().is_some() {
            batch_number += 1;
            for document in documents.by_ref().take(batch_size) {
                let key = document.key();
                match self.coordinator.index_document(document) {
                    Ok(outcome) => stats.record(ApplyOutcome::Upserted(outcome)),
                    Err(SearchError::InvalidDocument(reason)) => {
                        error!(document = %key, reason = %reason, "Skipping invalid document");
                        stats.skipped += 1;
                    }
                    Err(e) => return Err(IngestError::Rejected(e)),
                }
            }
            debug!(batch = batch_number, applied = stats.applied(), "Reindex batch applied");

            if documents.peek().is_some() {
                tokio::time::sleep(self.config.batch_pause()).await;
            }
        }

        info!(
            batches = batch_number,
            applied = stats.applied(),
            skipped = stats.skipped,
            "Bulk reindex finished"
        );
        Ok(stats)
    }
}
