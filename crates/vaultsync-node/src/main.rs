//! Vaultsync Node - encrypted vault storage and synchronization server.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use vaultsync_node::api::{create_router, AppState};
use vaultsync_node::config::{NodeConfig, StorageBackend};
use vaultsync_node::observability::init_logging;
use vaultsync_storage::{MemoryStore, SqliteStore};

/// Vaultsync Node - end-to-end encrypted vault synchronization
#[derive(Parser, Debug)]
#[command(name = "vaultsync-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "VAULTSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// API listen address
    #[arg(long)]
    listen_addr: Option<SocketAddr>,

    /// Storage backend
    #[arg(long, value_enum)]
    storage: Option<StorageBackend>,

    /// SQLite database file
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn apply(self, config: &mut NodeConfig) {
        if let Some(addr) = self.listen_addr {
            config.server.listen_addr = addr;
        }
        if let Some(backend) = self.storage {
            config.storage.backend = backend;
        }
        if let Some(path) = self.db_path {
            config.storage.path = Some(path);
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if self.log_json {
            config.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = NodeConfig::load(args.config.as_deref()).context("loading configuration")?;
    args.apply(&mut config);
    let config = config.validated()?;

    init_logging(&config.logging.level, config.logging.json);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting vaultsync node");
    tracing::info!(
        listen_addr = %config.server.listen_addr,
        storage = ?config.storage.backend,
        max_batch_items = config.limits.max_batch_items,
        "Node configuration"
    );

    let state = match (config.storage.backend, config.storage.path.as_ref()) {
        (StorageBackend::Sqlite, Some(path)) => {
            let store = Arc::new(
                SqliteStore::open(path)
                    .with_context(|| format!("opening database {}", path.display()))?,
            );
            AppState::new(&config, store.clone(), store)?
        }
        (StorageBackend::Sqlite, None) => anyhow::bail!("storage.path is required for sqlite"),
        (StorageBackend::Memory, _) => {
            tracing::warn!("in-memory storage: vault contents are lost on exit");
            let store = Arc::new(MemoryStore::new());
            AppState::new(&config, store.clone(), store)?
        }
    };

    let health = state.health.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.server.listen_addr))?;
    health.set_ready(true);
    tracing::info!(addr = %config.server.listen_addr, "Node is ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(health))
        .await
        .context("serving HTTP")?;

    tracing::info!("Vaultsync node stopped");
    Ok(())
}

async fn shutdown_signal(health: vaultsync_node::health::HealthState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    health.set_ready(false);
    tracing::info!("Shutting down");
}
