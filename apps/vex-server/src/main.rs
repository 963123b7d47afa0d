//! # Vex Server
//!
//! ## Startup
//! ```text
//! load config ──► open SQLite (migrations) ──► APNs client (if enabled)
//!      │
//!      ▼
//! bind ──► serve ──► Ctrl+C / SIGTERM ──► cancel pushes ──► close pool
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vex_db::Database;
use vex_push::{ApnsClient, PushDispatcher};
use vex_server::{build_router, AppState, ServerConfig};

const DEFAULT_LOG_FILTER: &str = "info,vex=debug,sqlx=warn";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting Vex MDM server...");

    let config = ServerConfig::load().context("Failed to load configuration")?;
    info!(
        addr = %config.server.bind_address(),
        database = %config.database.path.display(),
        push_enabled = config.push.enabled,
        "Configuration loaded"
    );

    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let db = Database::new(config.database.db_config())
        .await
        .context("Failed to open database")?;

    let push = match config.push.apns_config()? {
        Some(apns) => {
            let client = ApnsClient::from_config(&apns).context("Failed to initialize APNs client")?;
            Some(PushDispatcher::new(Arc::new(client), config.push.dispatcher_config()))
        }
        None => {
            warn!("Push disabled, devices only receive commands when they check in on their own");
            None
        }
    };

    let state = Arc::new(AppState::new(db.clone(), push));
    let app = build_router(state.clone());

    let bind_addr = config.server.bind_address();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {bind_addr}"))?;
    info!(addr = %bind_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.commander.shutdown();
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received, starting graceful shutdown...");
}
