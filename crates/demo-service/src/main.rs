//! `demo-service` — binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Register OpenTelemetry (traces, metrics, subscriber, signal shutdown).
//! 3. Build the Axum router and serve until the process is told to stop.

mod config;
mod protocol;
mod server;

use anyhow::{Context, Result};
use tracing::{error, info};

use config::Config;
use server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    let guard = otel_register::register(cfg.register_config()?)
        .context("failed to register OpenTelemetry")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        "demo-service starting"
    );

    // -----------------------------------------------------------------------
    // 3. HTTP server
    // -----------------------------------------------------------------------
    let router = server::router::build(AppState::from_guard(&guard));

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, router).await;

    // Only reached if the server stops on its own; signals exit via the
    // registration's shutdown task.
    if let Err(e) = guard.shutdown().await {
        error!(error = %e, "telemetry shutdown failed");
    }
    served?;
    Ok(())
}
