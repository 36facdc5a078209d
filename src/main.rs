//! Campus Trade - marketplace backend
//!
//! Listings, trade requests, messaging, SmartMatch recommendations and
//! carbon impact tracking for a campus peer-to-peer marketplace.

mod api;
mod carbon;
mod catalog;
mod config;
mod db;
mod error;
mod messaging;
mod notifications;
mod smartmatch;
mod trading;
mod validation;

use crate::api::create_router;
use crate::config::AppConfig;
use crate::db::Database;
use crate::messaging::Messenger;
use crate::notifications::{NotificationHub, Notifier};
use crate::smartmatch::SmartMatch;
use crate::trading::TradeEngine;

use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across all handlers
pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    pub notifier: Notifier,
    pub smartmatch: SmartMatch,
    pub trades: TradeEngine,
    pub messenger: Messenger,
}

impl AppState {
    pub fn new(config: AppConfig, db: Database) -> Self {
        let hub = Arc::new(NotificationHub::new(config.notification_channel_capacity));
        let notifier = Notifier::new(db.clone(), hub);
        let smartmatch = SmartMatch::new(db.clone(), config.smartmatch_candidate_limit);
        let trades = TradeEngine::new(db.clone(), notifier.clone(), smartmatch.clone());
        let messenger = Messenger::new(db.clone(), notifier.clone());

        Self {
            config,
            db,
            notifier,
            smartmatch,
            trades,
            messenger,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Campus Trade backend v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env()?;

    // Initialize database
    info!("Connecting to database...");
    let db = Database::new(&config.database_url, config.db_max_connections).await?;
    info!("Database connected");

    if config.run_migrations {
        db.migrate().await?;
    }

    let addr = config.bind_addr();
    let state = Arc::new(AppState::new(config, db));

    // Create router with all API endpoints
    let app = create_router(state);

    info!("Starting API server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
