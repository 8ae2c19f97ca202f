//! Change-feed ingestion
//!
//! Owning services publish at-least-once change notifications. This module
//! decodes them, normalizes payloads into documents and applies them to the
//! index in delivery order; out-of-order delivery is absorbed by the index
//! store's stale-write rejection.
//!
//! ```text
//! ChangeFeed (channel | JSON lines)
//!        │ ChangeEvent
//!        ▼
//! IngestionWorker ── retry/backoff on IndexUnavailable
//!        │
//!        ▼
//! SearchCoordinator::apply_change ─► DocumentNormalizer ─► IndexStore
//! ```
//!
//! Full rebuilds go through [`BulkReindexer`], which batches and throttles
//! writes instead of competing with the steady-state feed.

mod config;
mod error;
mod event;
mod feed;
mod normalize;
mod worker;

pub use config::IngestionConfig;
pub use error::{IngestError, IngestResult};
pub use event::{ChangeEvent, ChangeOperation};
pub use feed::{ChangeFeed, ChannelFeed, JsonLinesFeed};
pub use normalize::DocumentNormalizer;
pub use worker::{BulkReindexer, IngestStats, IngestionWorker};

use crate::search::{DeleteOutcome, UpsertOutcome};
use serde::{Deserialize, Serialize};

/// Effect of applying one change event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    Upserted(UpsertOutcome),
    Deleted(DeleteOutcome),
}
