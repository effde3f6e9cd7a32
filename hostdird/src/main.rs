mod api;
mod config;
mod directory;
mod settings;
mod store;
mod store_manager;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::config::{Backend, Config};
use crate::directory::{DirectoryService, SystemClock};
use crate::settings::SettingsService;
use crate::store::{HostStore, SettingsStore, db::HostDb, memory::MemoryStore};
use crate::store_manager::StoreHandle;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hostdird=info"))
        )
        .init();

    tracing::info!("Starting hostdird");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/hostdir/hostdird.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Open the record store
    let mut store_thread = None;
    let (hosts, settings_store): (Arc<dyn HostStore>, Arc<dyn SettingsStore>) =
        match config.directory.backend {
            Backend::Sqlite => {
                let db = HostDb::open(&config.directory.db_path)?;
                tracing::info!("Opened database at {:?}", config.directory.db_path);

                let handle = StoreHandle::spawn(db);
                store_thread = Some(handle.clone());
                (Arc::new(handle.clone()) as Arc<dyn HostStore>, Arc::new(handle) as Arc<dyn SettingsStore>)
            }
            Backend::Memory => {
                tracing::warn!("Using in-memory store; hosts are lost on restart");
                let store = Arc::new(MemoryStore::new());
                (store.clone() as Arc<dyn HostStore>, store as Arc<dyn SettingsStore>)
            }
        };

    let existing = hosts.list_all().await.context("Failed to read stored hosts")?;
    tracing::info!("{} hosts on record, TTL {}s", existing.len(), config.directory.ttl_secs);

    let directory = Arc::new(DirectoryService::new(
        hosts,
        Arc::new(SystemClock),
        &config.directory,
    ));
    let settings = Arc::new(SettingsService::new(
        settings_store,
        config.settings.token.clone(),
        config.directory.storage_timeout(),
    ));

    // Build API router
    let app = api::routes::router(api::routes::AppState { directory, settings });

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");
    cancel.cancel();

    if let Err(e) = server_handle.await {
        tracing::error!("Server task failed: {}", e);
    }

    // Stop the store thread once no request can reach it
    if let Some(handle) = store_thread {
        if let Err(e) = handle.shutdown().await {
            tracing::error!("Failed to shut down store: {}", e);
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
