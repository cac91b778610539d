use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trawler_core::{
    build_pool, load_config, validate_config, IndexerDefinition, IndexerRegistry, IrcSupervisor,
    ReleasePipeline, SqliteRepo, TcpConnector,
};

use trawler_server::{create_router, AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("TRAWLER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    // Open the database
    let repo = Arc::new(
        SqliteRepo::new(&config.database.path)
            .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?,
    );

    // Indexer definitions
    let definitions_dir = std::env::var("TRAWLER_DEFINITIONS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("definitions"));
    let definitions = load_definitions(&definitions_dir);
    info!(count = definitions.len(), "loaded indexer definitions");

    let registry = Arc::new(
        IndexerRegistry::new(definitions, &config.indexers)
            .map_err(|e| anyhow::anyhow!("Failed to build indexer registry: {}", e))?,
    );

    // Download clients + pipeline
    let pool = Arc::new(
        build_pool(&config.download_clients)
            .map_err(|e| anyhow::anyhow!("Failed to build download clients: {}", e))?,
    );
    let pipeline = Arc::new(ReleasePipeline::new(
        repo.clone(),
        repo.clone(),
        pool,
        config.pipeline.clone(),
    ));

    // IRC supervisor
    let supervisor = Arc::new(IrcSupervisor::new(
        repo.clone(),
        registry,
        pipeline,
        Arc::new(TcpConnector),
        config.irc.clone(),
    ));
    supervisor.start_handlers();

    // HTTP control plane
    let state = Arc::new(AppState::new(
        config.clone(),
        supervisor.clone(),
        repo.clone(),
        repo.clone(),
    ));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down irc handlers");
    supervisor.stop_handlers().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

/// Read every TOML definition in `dir`; a missing directory is fine.
fn load_definitions(dir: &Path) -> Vec<IndexerDefinition> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        warn!(dir = %dir.display(), "no indexer definitions directory");
        return Vec::new();
    };

    let mut definitions = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        match std::fs::read_to_string(&path) {
            Ok(contents) => match IndexerRegistry::parse_definition(&contents) {
                Ok(definition) => definitions.push(definition),
                Err(e) => warn!(file = %path.display(), "skipping definition: {}", e),
            },
            Err(e) => warn!(file = %path.display(), "unreadable definition: {}", e),
        }
    }
    definitions
}
