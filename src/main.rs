use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod config;
mod db;
mod error;
mod lambda;
mod model;
mod push;
mod registry;

use api::AppState;
use config::{Config, DeploymentMode};
use db::DBLayer;
use push::{FcmClient, PushProvider, UnconfiguredProvider};
use registry::DeviceRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------
    // Logging
    // -----------------------------
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // -----------------------------
    // Shared state / Dependencies
    // -----------------------------
    let db_dir = config.database_dir();
    std::fs::create_dir_all(&config.store_path)
        .with_context(|| format!("Failed to create {}", config.store_path.display()))?;
    let store = DBLayer::open(&db_dir, &config.collection_name)?;
    info!(path = %db_dir.display(), collection = %config.collection_name, "store ready");

    let push: Arc<dyn PushProvider> = match FcmClient::from_file(&config.service_account_path) {
        Ok(client) => {
            let client = match &config.fcm_base_url {
                Some(url) => client.with_base_url(url),
                None => client,
            };
            info!(project = client.project_id(), "FCM client ready");
            Arc::new(client)
        }
        Err(e) => {
            warn!("Push delivery disabled: {e:#}");
            Arc::new(UnconfiguredProvider::new(format!("{e:#}")))
        }
    };

    let state = AppState {
        registry: Arc::new(DeviceRegistry::new(Arc::new(store))),
        push,
    };
    let app = api::router(state);

    // -----------------------------
    // Entry adapter
    // -----------------------------
    match config.mode {
        DeploymentMode::Lambda => lambda::run(app).await,
        DeploymentMode::Listener => {
            let addr = config.listen_addr()?;
            let listener = TcpListener::bind(addr).await?;
            info!("Server listening on {addr}");
            axum::serve(listener, app.into_make_service()).await?;
            Ok(())
        }
    }
}
