use crate::error::AppError;
use crate::ingest::IngestionConfig;
use crate::search::{AccessPolicy, SearchConfig};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");
const ENV_PREFIX: &str = "UNIFIED_SEARCH";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Query, ranking and autocomplete settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Change-feed and bulk reindex settings
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Role grants used for tenant scoping and sensitive fields
    #[serde(default)]
    pub policy: AccessPolicy,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("CONFIG_PATH").ok();
        Self::load_from(config_path.as_deref())
    }

    /// Embedded defaults, then the optional file, then `UNIFIED_SEARCH__*` variables
    pub fn load_from(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml));

        // Override with config file if it exists
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder
            // Override with environment variables (prefix: UNIFIED_SEARCH__)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        let search = &self.search;
        if search.max_page_size == 0 {
            return Err(AppError::Configuration("search.max_page_size must be at least 1".into()));
        }
        if search.default_page_size == 0 || search.default_page_size > search.max_page_size {
            return Err(AppError::Configuration(format!(
                "search.default_page_size must be within 1..={}",
                search.max_page_size
            )));
        }
        if search.guest_page_cap == 0 {
            return Err(AppError::Configuration("search.guest_page_cap must be at least 1".into()));
        }
        if search.autocomplete_limit == 0 {
            return Err(AppError::Configuration(
                "search.autocomplete_limit must be at least 1".into(),
            ));
        }
        if self.ingestion.channel_capacity == 0 {
            return Err(AppError::Configuration(
                "ingestion.channel_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            prometheus_enabled: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
