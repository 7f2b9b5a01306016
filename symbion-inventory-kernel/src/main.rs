/**
 * SYMBION INVENTORY KERNEL - Point d'entrée du service d'inventaire
 *
 * RÔLE : Charge kernel.yaml, construit une NodeSource par source déclarée et
 * sert les node sets en HTTP.
 *
 * ARCHITECTURE : SnapshotConnector → NodeSource (cache + refresh) → API REST.
 */

mod config;
mod health;
mod http;
mod sources;

use crate::config::load_config;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::sources::SourceRegistry;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await?;
    if !cfg.snapshot_dir.is_dir() {
        tracing::warn!(dir = %cfg.snapshot_dir.display(), "snapshot directory missing, sources will fail until it exists");
    }

    let registry = Arc::new(SourceRegistry::from_config(&cfg));
    info!(
        started = registry.len(),
        rejected = registry.rejected().len(),
        "sources initialized"
    );

    let app_state = AppState {
        registry,
        health_tracker: HealthTracker::new(),
        api_key: std::env::var("SYMBION_API_KEY").ok(),
    };
    let app = http::build_router(app_state);

    let listener = TcpListener::bind(&cfg.bind)
        .await
        .with_context(|| format!("binding {}", cfg.bind))?;
    info!("listening on http://{}", cfg.bind);
    axum::serve(listener, app).await.context("HTTP server stopped")?;
    Ok(())
}
