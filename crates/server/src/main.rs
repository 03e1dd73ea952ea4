mod api;
mod bootstrap;
mod health;

use std::time::Duration;

use anyhow::Result;
use atelier_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use atelier_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    let router = health::router(app.db_pool.clone()).merge(api::router(api::ApiState::from_pool(
        app.db_pool.clone(),
    )));

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "atelier-server started"
    );

    let drain_limit = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let serve = axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown());

    tokio::select! {
        result = serve => result?,
        // cap the drain window so a stuck request cannot hold shutdown forever
        _ = async {
            let _ = tokio::signal::ctrl_c().await;
            tokio::time::sleep(drain_limit).await;
        } => {
            tracing::warn!(
                event_name = "system.server.drain_timeout",
                correlation_id = "shutdown",
                "graceful shutdown window elapsed, aborting in-flight requests"
            );
        }
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "atelier-server stopping"
    );
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!(
            event_name = "system.server.shutdown_signal",
            correlation_id = "shutdown",
            "shutdown signal received, draining connections"
        );
    }
}
