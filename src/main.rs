//! MoveQuest Tester - ESP32 wearable test dashboard
//!
//! Keeps a registry of wearable devices, polls each one on a fixed interval,
//! and relays interval/session/motor commands from the dashboard.

mod api;
mod config;
mod device;
mod dispatch;
mod error;
mod models;
mod poll;
mod registry;
mod simulator;

use std::net::SocketAddr;
use std::sync::Arc;

use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::device::{DeviceConnector, HttpConnector};
use crate::poll::PollCoordinator;
use crate::registry::{DeviceRegistry, RegistryStore};
use crate::simulator::SimulatedWearable;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "movequest_tester=info,tower_http=debug".into()),
        )
        .init();

    tracing::info!("Starting MoveQuest Tester...");

    // Load configuration
    let config = config::Config::load()?;
    tracing::info!("Configuration loaded");

    // Optional simulated wearable on its own port
    if config.simulator.enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.simulator.port));
        let (bound, _task) = simulator::bind(SimulatedWearable::new(), addr).await?;
        tracing::info!("Simulated wearable listening on {}", bound);
    }

    // Device registry
    let registry = Arc::new(DeviceRegistry::load(RegistryStore::new(config.registry.path.clone())).await);
    tracing::info!(
        "Device registry loaded with {} devices",
        registry.len().await
    );

    // Poll loop
    let connector: Arc<dyn DeviceConnector> = Arc::new(HttpConnector::new()?);
    let coordinator = PollCoordinator::new(registry, connector, &config.poll).await;
    let poll_handle = coordinator.start();

    // Build application router
    let cors = CorsLayer::permissive();

    let app = api::routes()
        .with_state(AppState::new(coordinator))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        );

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    poll_handle.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
