use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use unified_search::{
    config::{Config, ObservabilityConfig},
    ingest::{IngestionWorker, JsonLinesFeed},
    search::{
        metrics, AutocompleteRequest, CallerContext, MatchMode, SearchCoordinator, SearchRequest,
    },
};

#[derive(Parser)]
#[command(name = "unified-search")]
#[command(version, about = "Tenant-aware search over parts, equipment, companies, listings and services", long_about = None)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<String>,

    /// JSON-lines change feed replayed into the index before the command runs
    #[arg(short, long, value_name = "FILE")]
    feed: Vec<PathBuf>,

    /// Caller user id; omit to search as a guest
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Caller tenant
    #[arg(short, long, global = true)]
    tenant: Option<String>,

    /// Caller role (repeatable)
    #[arg(short, long = "role", global = true)]
    roles: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a search query
    Search {
        #[arg(value_name = "QUERY")]
        query: String,

        /// Entity type, or `all`
        #[arg(short = 'T', long = "type")]
        entity_type: Option<String>,

        /// Equality filter as field=value (repeatable)
        #[arg(short = 'F', long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,

        /// relevance, rating, price or eta
        #[arg(short, long)]
        sort: Option<String>,

        /// Match any query token instead of all of them
        #[arg(long)]
        any: bool,

        #[arg(short, long)]
        page: Option<i64>,

        #[arg(short = 'n', long)]
        page_size: Option<i64>,
    },

    /// Suggest completions for a partial query
    Autocomplete {
        #[arg(value_name = "QUERY")]
        query: String,

        #[arg(short = 'T', long = "type")]
        entity_type: Option<String>,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Replay the feeds and report ingestion counts only
    Ingest,

    /// Show index statistics and health
    Stats,

    /// Print Prometheus metrics after replaying the feeds
    Metrics,
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("filter '{}' is not in field=value form", raw))?;
    if field.trim().is_empty() {
        return Err(format!("filter '{}' has an empty field name", raw));
    }
    Ok((field.trim().to_string(), value.trim().to_string()))
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("unified_search={}", config.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries command output
    if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    config.validate()?;
    init_tracing(&config.observability);

    info!("Starting unified-search v{}", env!("CARGO_PKG_VERSION"));
    if config.observability.prometheus_enabled {
        metrics::init_search_metrics();
    }

    let coordinator = SearchCoordinator::new(config.search.clone(), config.policy.clone());
    let worker = IngestionWorker::new(coordinator.clone(), config.ingestion.clone());

    let mut ingested = Vec::with_capacity(cli.feed.len());
    for path in &cli.feed {
        let mut feed = JsonLinesFeed::open(path)
            .await
            .with_context(|| format!("failed to open feed {}", path.display()))?;
        let stats = worker
            .run(&mut feed)
            .await
            .with_context(|| format!("failed to replay feed {}", path.display()))?;
        ingested.push(stats);
    }

    let caller = CallerContext {
        user_id: cli.user,
        tenant_id: cli.tenant,
        roles: cli.roles,
    };

    match cli.command {
        Commands::Search {
            query,
            entity_type,
            filters,
            sort,
            any,
            page,
            page_size,
        } => {
            let request = SearchRequest {
                query,
                entity_type,
                filters: filters.into_iter().collect(),
                sort,
                match_mode: any.then_some(MatchMode::Any),
                page,
                page_size,
            };
            let response = coordinator.search(request, caller).await?;
            print_json(&response)?;
        }
        Commands::Autocomplete {
            query,
            entity_type,
            limit,
        } => {
            let request = AutocompleteRequest {
                query,
                entity_type,
                limit,
            };
            let response = coordinator.autocomplete(&request, &caller)?;
            print_json(&response)?;
        }
        Commands::Ingest => print_json(&ingested)?,
        Commands::Stats => {
            print_json(&serde_json::json!({
                "index": coordinator.stats()?,
                "health": coordinator.health(),
            }))?;
        }
        Commands::Metrics => print!("{}", metrics::gather_text()),
    }

    Ok(())
}
