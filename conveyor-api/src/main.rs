use anyhow::Context;
use conveyor_api::{config::ApiConfig, startup::Application};
use conveyor_config::load_config;
use conveyor_telemetry::tracing::init_tracing;
use tracing::info;

/// Entry point for the conveyor API service.
///
/// Initializes tracing and starts the Actix web server with the embedded
/// pipeline execution engine.
fn main() -> anyhow::Result<()> {
    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    actix_web::rt::System::new().block_on(async_main())?;

    Ok(())
}

async fn async_main() -> anyhow::Result<()> {
    let config =
        load_config::<ApiConfig>().context("loading API configuration for server startup")?;

    info!(
        host = config.application.host,
        port = config.application.port,
        workers = config.engine.workers,
        "starting conveyor api"
    );

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
