//! Error types for search operations

use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors that can occur during planning, lookup and indexing
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchError {
    /// Query contained no searchable tokens
    #[error("Query is empty after tokenization")]
    EmptyQuery,

    /// Requested entity type is not a recognized value
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// Filter references a field no requested entity type declares
    #[error("Unknown filter field '{field}' for entity type '{entity_type}'")]
    UnknownFilterField { entity_type: String, field: String },

    /// Filter references a sensitive field the caller may not read
    #[error("Filtering on restricted field '{0}' is not permitted")]
    RestrictedFilterField(String),

    /// Sort mode is not one of relevance, rating, price, eta
    #[error("Unknown sort mode: {0}")]
    UnknownSortMode(String),

    /// Document or change event failed normalization/invariant checks
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Index store cannot be read or written right now
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// Request deadline elapsed before the search completed
    #[error("Search timed out: {0}")]
    Timeout(String),
}

/// Error classification used by transports to pick a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    EmptyQuery,
    UnknownEntityType,
    UnknownFilterField,
    RestrictedFilterField,
    UnknownSortMode,
    InvalidDocument,
    IndexUnavailable,
    Timeout,
}

impl ErrorKind {
    /// Caller errors: returned immediately, never retried
    pub fn is_client_error(&self) -> bool {
        !self.is_retryable()
    }

    /// Infrastructure errors the caller may retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::IndexUnavailable | ErrorKind::Timeout)
    }
}

impl SearchError {
    /// Get the classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchError::EmptyQuery => ErrorKind::EmptyQuery,
            SearchError::UnknownEntityType(_) => ErrorKind::UnknownEntityType,
            SearchError::UnknownFilterField { .. } => ErrorKind::UnknownFilterField,
            SearchError::RestrictedFilterField(_) => ErrorKind::RestrictedFilterField,
            SearchError::UnknownSortMode(_) => ErrorKind::UnknownSortMode,
            SearchError::InvalidDocument(_) => ErrorKind::InvalidDocument,
            SearchError::IndexUnavailable(_) => ErrorKind::IndexUnavailable,
            SearchError::Timeout(_) => ErrorKind::Timeout,
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err.kind() {
            ErrorKind::IndexUnavailable => AppError::Unavailable(err.to_string()),
            ErrorKind::Timeout => AppError::Timeout(err.to_string()),
            _ => AppError::Validation(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_not_retryable() {
        let errors = vec![
            SearchError::EmptyQuery,
            SearchError::UnknownEntityType("widget".to_string()),
            SearchError::UnknownFilterField {
                entity_type: "part".to_string(),
                field: "colour".to_string(),
            },
            SearchError::UnknownSortMode("newest".to_string()),
        ];

        for err in errors {
            assert!(err.kind().is_client_error(), "{err} should be a client error");
            assert!(!err.kind().is_retryable());
        }
    }

    #[test]
    fn test_infrastructure_errors_are_retryable() {
        assert!(SearchError::IndexUnavailable("lock timeout".into()).kind().is_retryable());
        assert!(SearchError::Timeout("ranking".into()).kind().is_retryable());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::UnknownFilterField.to_string(), "unknown_filter_field");
        assert_eq!(SearchError::EmptyQuery.kind().as_ref(), "empty_query");
    }

    #[test]
    fn test_conversion_to_app_error() {
        let app: AppError = SearchError::IndexUnavailable("offline".into()).into();
        assert_eq!(app.error_code(), "UNAVAILABLE");

        let app: AppError = SearchError::EmptyQuery.into();
        assert_eq!(app.error_code(), "VALIDATION_ERROR");
    }
}
