use anyhow::Result;
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{io::ErrorKind, path::Path, str::FromStr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{
    blob_store::LocalBlobStore, idempotency_service::IdempotencyCoordinator,
    sqlite_store::SqliteStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;
    tracing::info!("Starting listing-service with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );
    let store = SqliteStore::new(db);

    // --- Handle migration mode ---
    if migrate {
        let applied = store.migrate().await?;
        tracing::info!("Database migration complete ({} statements).", applied);
        return Ok(());
    }

    // --- Blob store ---
    let blobs = LocalBlobStore::new(&cfg.storage_dir).await?;
    tracing::info!("Photo storage rooted at {}", blobs.root().display());

    // --- Wire services ---
    let state = state::AppState::new(store, Arc::new(blobs), cfg.idempotency_ttl());
    spawn_idempotency_sweep(state.idempotency.clone(), cfg.sweep_interval());

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically remove expired idempotency records. Lookups already treat
/// expired records as absent; this only bounds table growth.
fn spawn_idempotency_sweep(coordinator: IdempotencyCoordinator, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = coordinator.sweep_expired().await {
                tracing::error!("idempotency sweep failed: {}", err);
            }
        }
    });
}
