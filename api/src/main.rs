use anyhow::Context;
use insights_api::{AppState, build_router};
use insights_store::{InsightsConfig, Store};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = InsightsConfig::from_env()?;
    let store = Store::open(&config.db_path)?;
    info!(path = ?config.db_path, "connected to document store");
    if config.slack_signing_secret.is_none() {
        info!("SLACK_SIGNING_SECRET unset; webhook signatures are not verified");
    }

    let app = build_router(AppState::new(store, &config));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "server running");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(err = ?e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal, closing store");
}
