//! Inventory Transfer service
//!
//! ```text
//! ┌──────────┐    ┌─────────────┐    ┌─────────────┐    ┌──────────────┐
//! │  Config  │───▶│   Storage   │───▶│ Coordinator │───▶│ HTTP Gateway │
//! │  (YAML)  │    │ (mem / pg)  │    │  (FSM+UoW)  │    │   (axum)     │
//! └──────────┘    └─────────────┘    └─────────────┘    └──────────────┘
//! ```
//!
//! Usage: `inventory_transfer [--env dev] [--port 8080]`

use std::sync::Arc;

use anyhow::{Context, Result};

use inventory_transfer::config::{AppConfig, StorageBackend};
use inventory_transfer::db::Database;
use inventory_transfer::gateway::{self, state::AppState};
use inventory_transfer::transfer::store::schema::init_schema;
use inventory_transfer::transfer::{
    MemoryTransferStore, PgTransferStore, SeedData, TransferCoordinator,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

fn load_seed(config: &AppConfig) -> Result<Option<SeedData>> {
    config
        .storage
        .seed_file
        .as_deref()
        .map(SeedData::load)
        .transpose()
}

async fn build_coordinator(config: &AppConfig) -> Result<TransferCoordinator> {
    let seed = load_seed(config)?;

    match config.storage.backend {
        StorageBackend::Memory => {
            let store = Arc::new(MemoryTransferStore::new());
            if let Some(seed) = &seed {
                seed.apply_memory(&store).await;
            } else {
                tracing::warn!("Memory store started empty (no storage.seed_file)");
            }
            Ok(TransferCoordinator::new(store))
        }
        StorageBackend::Postgres => {
            let url = config
                .storage
                .postgres_url
                .as_deref()
                .context("storage.postgres_url is required for the postgres backend")?;
            let db = Database::connect(url, config.storage.max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            db.health_check().await?;
            init_schema(db.pool()).await?;
            if let Some(seed) = &seed {
                seed.apply_postgres(db.pool()).await?;
            }
            Ok(TransferCoordinator::new(Arc::new(PgTransferStore::new(
                db.into_pool(),
            ))))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = inventory_transfer::logging::init_logging(&app_config);

    tracing::info!(
        env = %env,
        backend = ?app_config.storage.backend,
        git_hash = env!("GIT_HASH"),
        "Starting inventory transfer service"
    );

    let coordinator = build_coordinator(&app_config).await?;
    let state = Arc::new(AppState::new(Arc::new(coordinator)));

    // Get Gateway config from YAML, allow --port override
    let port = get_port_override().unwrap_or(app_config.gateway.port);
    gateway::run_server(&app_config.gateway.host, port, state).await
}
