//! Tenant-aware search and indexing for B2B marketplace catalogs
//!
//! Parts, equipment, companies, listings and services are indexed into one
//! engine and queried through a single [`search::SearchCoordinator`]. Change
//! notifications from the owning services are applied by the [`ingest`]
//! worker.

pub mod config;
pub mod error;
pub mod ingest;
pub mod search;

pub use crate::config::{Config, ObservabilityConfig};
pub use crate::error::{AppError, Result};
