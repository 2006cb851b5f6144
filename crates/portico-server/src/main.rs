mod setup;

use portico_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    let manager = crate::setup::initialize_engine(config).await?;
    manager.start_listening();

    setup::shutdown_signal().await;

    manager.stop_listening();
    manager.wait_for_shutdown().await;
    tracing::info!("Queue listeners stopped");
    portico_infra::shutdown_telemetry().await;

    Ok(())
}
