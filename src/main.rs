//! Process entry point: logging, configuration, shutdown wiring.

use anyhow::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roon_discord_presence::{bridge::Bridge, config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roon_discord_presence=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Roon Discord presence bridge");

    let config = config::load_config()?;
    config.validate()?;
    tracing::info!(?config, "Configuration loaded");

    let shutdown = CancellationToken::new();

    if let Some(secs) = config.app.auto_shutdown_secs {
        let token = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            tracing::info!("auto-shutdown timer elapsed");
            token.cancel();
        });
    }

    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received ctrl-c");
            token.cancel();
        }
    });

    Bridge::new(config, shutdown).run().await
}
