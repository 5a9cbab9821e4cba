//! Courier Server - standalone entry point for the Courier API
//!
//! Thin wrapper around `courier-api` providing a runnable binary.

use anyhow::{Context, Result};
use courier_api::{CourierConfig, CourierServer};

#[tokio::main]
async fn main() -> Result<()> {
    courier_api::server::init_tracing();

    tracing::info!("Starting Courier server v{}", env!("CARGO_PKG_VERSION"));

    // COURIER_PORT takes precedence over a platform-provided PORT
    let config = CourierConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        addr = %config.server.addr,
        bulk_threshold = config.admission.bulk_threshold,
        max_in_flight = config.worker.max_in_flight,
        tolerance = ?config.admission.tolerance,
        "Configuration loaded"
    );

    let server = CourierServer::new(config).map_err(|e| {
        tracing::error!("Failed to initialize server: {}", e);
        e
    })?;

    server.run().await.map_err(|e| {
        tracing::error!("Server error during execution: {}", e);
        e
    })?;

    Ok(())
}
