use std::net::SocketAddr;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use clone_server::{build_router, config::ServerConfig, run_retention, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting voice cloning server...");

    let config = ServerConfig::from_env()?;
    info!(
        "Server configuration loaded: port={}, backend={}, language={}, max_concurrent_synthesis={}",
        config.port,
        config.backend.kind(),
        config.language,
        config.max_concurrent_synthesis
    );

    // Without a working model the service cannot do anything useful.
    let cloner = clone_core::load_cloner(&config.backend)
        .await
        .context("Could not initialize voice cloning model")?;

    let state = AppState::new(config.clone(), cloner)?;

    match config.retention_max_age() {
        Some(max_age) => {
            info!(
                "Retention enabled: deleting files older than {}h every {}s",
                config.retention_max_age_hours.unwrap_or_default(),
                config.retention_sweep_interval().as_secs()
            );
            tokio::spawn(run_retention(
                state.manager.clone(),
                max_age,
                config.retention_sweep_interval(),
            ));
        }
        None => warn!("RETENTION_MAX_AGE_HOURS not set, stored audio is never deleted"),
    }

    let app = build_router(state)?;

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
