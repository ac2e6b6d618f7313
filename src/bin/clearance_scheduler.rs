//! Clearance Scheduler Binary
//!
//! Loads configuration, connects to PostgreSQL, runs migrations and drives the
//! four sweeps until Ctrl-C.

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

use clearance_core::config::ConfigManager;
use clearance_core::database::DatabaseConnection;
use clearance_core::engine::ClearanceEngine;
use clearance_core::logging::init_structured_logging;
use clearance_core::scheduler::ExecutionMode;
use clearance_core::store::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let manager = ConfigManager::load().context("loading configuration")?;
    let config = manager.config();
    info!(
        environment = %manager.environment(),
        config_file = %manager.config_file().display(),
        "Configuration loaded"
    );

    let connection = DatabaseConnection::connect(&config.database)
        .await
        .context("connecting to database")?;
    connection.migrate().await.context("running migrations")?;

    let store = Arc::new(PgStore::new(connection.pool().clone()));
    let engine = ClearanceEngine::builder(config)
        .with_backend(store.clone())
        .with_catalog(store)
        .with_execution_mode(ExecutionMode::Inline)
        .build()
        .context("assembling engine")?;

    if !config.scheduler.enabled {
        info!("Scheduler disabled in configuration; exiting");
        connection.close().await;
        return Ok(());
    }

    let handle = engine.scheduler().start();
    info!(loops = handle.running_loops(), "Clearance scheduler running");

    signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("Shutdown signal received");

    handle.shutdown().await;
    connection.close().await;
    info!("Clearance scheduler stopped");
    Ok(())
}
