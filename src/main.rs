use anyhow::Context;
use files_manager::app::CACHE_SWEEP_INTERVAL;
use files_manager::{logging, App, Config};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Invalid configuration")?;

    logging::init(&config.log_level);

    let app = App::build(&config).context("Failed to initialize storage")?;
    app.spawn_worker();
    app.spawn_cache_sweeper(CACHE_SWEEP_INTERVAL);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {address}"))?;

    info!("files manager running on http://{address}");
    info!("blobs stored under {}", config.folder_path);

    axum::serve(listener, app.router())
        .await
        .context("Failed to start server")?;

    Ok(())
}
