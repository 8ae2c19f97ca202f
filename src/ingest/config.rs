//! Ingestion configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Change-feed ingestion and bulk reindex settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Retries for events that hit an unavailable index
    pub max_retries: u32,

    /// Initial retry delay, doubled per attempt
    pub retry_backoff_ms: u64,

    /// Capacity of the in-process change channel
    pub channel_capacity: usize,

    /// Documents applied per bulk reindex batch
    pub batch_size: usize,

    /// Pause between bulk reindex batches
    pub batch_pause_ms: u64,

    /// Tombstones older than this are purged
    pub tombstone_retention_secs: u64,

    /// Feed events between tombstone purges; 0 purges only at end of run
    pub purge_interval_events: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 100,
            channel_capacity: 1024,
            batch_size: 500,
            batch_pause_ms: 50,
            tombstone_retention_secs: 86_400,
            purge_interval_events: 10_000,
        }
    }
}

impl IngestionConfig {
    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(10);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn tombstone_retention(&self) -> Duration {
        Duration::from_secs(self.tombstone_retention_secs)
    }

    /// Whether a purge is due after `events` feed events
    pub fn purge_due(&self, events: usize) -> bool {
        self.purge_interval_events > 0 && events > 0 && events % self.purge_interval_events == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let config = IngestionConfig {
            retry_backoff_ms: 10,
            ..Default::default()
        };
        assert_eq!(config.backoff(1), Duration::from_millis(10));
        assert_eq!(config.backoff(2), Duration::from_millis(20));
        assert_eq!(config.backoff(3), Duration::from_millis(40));
    }

    #[test]
    fn test_purge_interval() {
        let config = IngestionConfig {
            purge_interval_events: 3,
            ..Default::default()
        };
        assert!(!config.purge_due(0));
        assert!(!config.purge_due(2));
        assert!(config.purge_due(3));
        assert!(config.purge_due(6));

        let disabled = IngestionConfig {
            purge_interval_events: 0,
            ..Default::default()
        };
        assert!(!disabled.purge_due(3));
    }
}
