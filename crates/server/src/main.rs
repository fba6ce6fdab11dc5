mod api;
mod bootstrap;
mod health;

use anyhow::Result;
use relay_core::config::{AppConfig, LoadOptions};

use crate::api::ApiState;
use crate::health::HealthState;

fn init_logging(config: &AppConfig) {
    use relay_core::config::LogFormat::*;
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
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config);
    let readiness = app.gateway_runner.readiness();

    let router = api::app(
        ApiState::new(app.store.clone(), app.config.store.recent_limit),
        HealthState::new(app.store.clone(), readiness, app.ingress_enabled),
    );
    api::spawn(&app.config.server.bind_address, app.config.server.port, router).await?;

    tracing::info!(
        event_name = "system.server.gateway_transport_mode",
        transport_mode = if app.gateway_runner.is_noop_transport() { "noop" } else { "channel" },
        correlation_id = "bootstrap",
        "gateway runner transport mode initialized"
    );

    if app.awaiting_gateway_client() {
        tracing::warn!(
            event_name = "system.server.gateway_client_detached",
            correlation_id = "bootstrap",
            "ingress configured but no gateway client is attached; \
             /health reports ingress as connecting until one pushes a ready event"
        );
    }

    let gateway_runner = app.gateway_runner;
    let gateway = tokio::spawn(async move {
        if let Err(error) = gateway_runner.start().await {
            tracing::error!(
                event_name = "system.server.gateway_error",
                correlation_id = "bootstrap",
                error = %error,
                "gateway runner stopped with an error; api keeps serving"
            );
        }
    });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "relay-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "relay-server stopping"
    );

    drop(app.gateway_sender);
    gateway.abort();

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
