//! Engine setup and initialization

pub mod database;
pub mod listeners;
pub mod services;
pub mod storage;

use anyhow::{Context, Result};
use portico_core::Config;
use portico_infra::LogFormat;
use portico_worker::ListenerManager;

const SERVICE_NAME: &str = "portico-engine";

/// Build every component and register the queue listeners. Nothing polls until
/// the returned manager is started.
pub async fn initialize_engine(config: Config) -> Result<ListenerManager> {
    config.validate().context("Configuration validation failed")?;

    let log_format = config
        .log_format()
        .parse::<LogFormat>()
        .map_err(|e| anyhow::anyhow!(e))?;
    portico_infra::init_telemetry(log_format, SERVICE_NAME, config.environment())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(
        environment = %config.environment(),
        storage_backend = ?config.storage_backend(),
        "Configuration loaded and validated successfully"
    );

    let pool = database::setup_database(&config).await?;
    let store = storage::setup_storage(&config).await?;
    let lookup = listeners::setup_queue_lookup(&config).await?;
    let services = services::initialize_services(&config, pool, store, lookup.clone()).await?;

    Ok(listeners::setup_listeners(&config, lookup, services))
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
