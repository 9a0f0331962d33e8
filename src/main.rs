use anyhow::{Context, Result};
use catalog_search::catalog::FsCatalog;
use catalog_search::config::Config;
use catalog_search::http::{self, AppState};
use catalog_search::mcp_server::CatalogServer;
use catalog_search::search::{IndexCache, SearchFilters};
use clap::{Parser, Subcommand};
use rmcp::{ServiceExt, transport::stdio};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(
    name = "catalog-search",
    about = "In-memory search over a YAML filament catalog",
    version
)]
struct Cli {
    /// JSON config file (defaults to the per-user config)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Catalog root containing brands/, materials/, ...
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Seconds a built index stays fresh
    #[arg(long)]
    ttl: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Listen address, e.g. 127.0.0.1:3000
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run the MCP server over stdio
    Mcp,

    /// Run one query and print the results as JSON
    Search {
        query: String,

        /// Comma-separated result types
        #[arg(long)]
        types: Option<String>,

        /// Brand slug
        #[arg(long)]
        brand: Option<String>,

        #[arg(long)]
        material_type: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },
}

/// Log to stderr (stdout carries MCP traffic), plus daily files when configured
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_ansi(false);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "catalog-search.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter())
                .with(stderr_layer)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter())
                .with(stderr_layer)
                .init();
            None
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    // Command line wins over the file
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if let Some(ttl) = cli.ttl {
        config.index_ttl_secs = ttl;
    }
    if let Commands::Serve { bind: Some(bind) } = &cli.command {
        config.bind_addr = bind.clone();
    }

    Ok(config)
}

fn open_catalog(config: &Config) -> Result<FsCatalog> {
    match &config.data_dir {
        Some(dir) => Ok(FsCatalog::new(dir)),
        None => FsCatalog::discover(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    let catalog = Arc::new(open_catalog(&config)?);
    tracing::info!("Catalog root: {:?}", catalog.root());
    let cache = IndexCache::new(catalog.clone(), config.index_ttl());
    let config = Arc::new(config);

    match cli.command {
        Commands::Serve { .. } => {
            tracing::info!("Starting catalog search HTTP server");
            if config.warm_on_start {
                cache.warm();
            }
            let bind_addr = config.bind_addr.clone();
            let state = AppState {
                cache,
                catalog,
                config,
            };
            http::serve(state, &bind_addr).await?;
        }
        Commands::Mcp => {
            tracing::info!("Starting catalog search MCP server");
            if config.warm_on_start {
                cache.warm();
            }
            let server = CatalogServer::new(cache, config);
            let service = server.serve(stdio()).await?;
            service.waiting().await?;
        }
        Commands::Search {
            query,
            types,
            brand,
            material_type,
            limit,
        } => {
            let filters = SearchFilters::from_raw(
                types.as_deref(),
                brand.as_deref(),
                material_type.as_deref(),
            );

            let results = cache
                .search(&query, &filters, config.clamp_limit(limit))
                .await?;
            let output =
                serde_json::to_string_pretty(&results).context("Failed to serialize results")?;
            println!("{output}");
        }
    }

    Ok(())
}
