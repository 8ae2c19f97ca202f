//! Error types for change-feed ingestion

use crate::error::AppError;
use crate::search::SearchError;

/// Result type for ingestion operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Errors that can occur while reading or applying a change feed
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The feed source could not be read
    #[error("Feed read failed: {0}")]
    Io(#[from] std::io::Error),

    /// A feed entry could not be decoded into a change event
    #[error("Malformed change event at {source_name}:{line}: {reason}")]
    Malformed {
        source_name: String,
        line: usize,
        reason: String,
    },

    /// Normalization or indexing rejected the event
    #[error("Change event rejected: {0}")]
    Rejected(#[from] SearchError),

    /// The index stayed unavailable through every retry
    #[error("Gave up on event {event_id} after {attempts} attempts: {reason}")]
    RetriesExhausted {
        event_id: String,
        attempts: u32,
        reason: String,
    },
}

impl IngestError {
    /// Whether the worker should skip this event and keep draining
    pub fn is_skippable(&self) -> bool {
        match self {
            IngestError::Malformed { .. } => true,
            IngestError::Rejected(err) => err.kind().is_client_error(),
            IngestError::Io(_) | IngestError::RetriesExhausted { .. } => false,
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Io(e) => AppError::Io(e),
            IngestError::Rejected(e) => e.into(),
            IngestError::RetriesExhausted { .. } => AppError::Unavailable(err.to_string()),
            IngestError::Malformed { .. } => AppError::Ingestion(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skippable_errors() {
        let malformed = IngestError::Malformed {
            source_name: "feed.jsonl".to_string(),
            line: 3,
            reason: "missing field `id`".to_string(),
        };
        assert!(malformed.is_skippable());
        assert!(IngestError::Rejected(SearchError::InvalidDocument("empty id".into())).is_skippable());
        assert!(!IngestError::Rejected(SearchError::IndexUnavailable("offline".into())).is_skippable());
    }

    #[test]
    fn test_conversion_to_app_error() {
        let app: AppError = IngestError::RetriesExhausted {
            event_id: "e1".to_string(),
            attempts: 3,
            reason: "offline".to_string(),
        }
        .into();
        assert_eq!(app.error_code(), "UNAVAILABLE");

        let app: AppError = IngestError::Malformed {
            source_name: "feed.jsonl".to_string(),
            line: 1,
            reason: "bad".to_string(),
        }
        .into();
        assert_eq!(app.error_code(), "INGESTION_ERROR");
    }
}
