mod config;
mod handlers;
mod inventory;
mod models;
mod netbox;
mod provision;
mod router;
mod utils;

use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use inventory::{Inventory, MemoryInventory};
use netbox::{NetBoxClient, NetBoxInventory};
use provision::ProvisionSettings;

/// Application state shared across handlers
pub struct AppState {
    pub inventory: Arc<dyn Inventory>,
    pub settings: ProvisionSettings,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before anything reads the environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "popforge=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let cfg = Config::load();
    tracing::info!("Starting PopForge Server");
    tracing::info!("NetBox: {}", cfg.netbox_url);
    tracing::info!("Listen: {}", cfg.listen_addr);

    // Connect the inventory backend
    let inventory: Arc<dyn Inventory> = if cfg.netbox_token.is_empty() {
        tracing::warn!("NETBOX_TOKEN not set - running against an empty in-memory inventory");
        Arc::new(MemoryInventory::new())
    } else {
        let client = NetBoxClient::new(cfg.netbox_url.clone(), cfg.netbox_token.clone())?;
        if !client.test_connection().await {
            tracing::warn!("NetBox at {} is not reachable", cfg.netbox_url);
        }
        Arc::new(NetBoxInventory::new(client))
    };

    // Create app state
    let state = Arc::new(AppState {
        inventory,
        settings: cfg.provision_settings(),
    });

    // Build router
    let app = router::build(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    tracing::info!("PopForge listening on {}", cfg.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("PopForge shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
