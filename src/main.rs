// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::application::cooling_engine::{CoolingEngine, EngineSettings};
use crate::application::telemetry_store::TelemetryStore;
use crate::infrastructure::config::{load_app_config, AppConfig, StoreBackend};
use crate::infrastructure::firestore_repository::FirestoreRepository;
use crate::infrastructure::memory_store::MemoryStore;
use crate::presentation::app_state::AppState;
use crate::presentation::router::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let app_config = load_app_config()?;

    // Initialize tracing, RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&app_config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Create store (infrastructure layer)
    let store = build_store(&app_config)?;

    // Create engine (application layer)
    let engine = CoolingEngine::new(
        store,
        EngineSettings {
            hysteresis: app_config.cooling.hysteresis,
            relay_channels: app_config.cooling.relay_channels.clone(),
            history_default_limit: app_config.history.default_limit,
            history_max_limit: app_config.history.max_limit,
        },
    );

    let state = Arc::new(AppState { engine });
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", app_config.server.host, app_config.server.port)
        .parse()
        .context("Invalid server.host / server.port")?;
    tracing::info!(
        "Starting solar-cooling-relay on {} with {:?} store",
        addr,
        app_config.store.backend
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn build_store(app_config: &AppConfig) -> anyhow::Result<Arc<dyn TelemetryStore>> {
    match app_config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new(
            app_config.store.memory_history_capacity,
        ))),
        StoreBackend::Firestore => Ok(Arc::new(FirestoreRepository::new(
            &app_config.firestore,
            app_config.store.clone(),
        )?)),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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
    tracing::info!("Shutdown signal received");
}
