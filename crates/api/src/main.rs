//! Demand API - hourly fleet demand forecasts over HTTP
//!
//! Serves bounded forecasts and decisions, plus paced server-sent-event
//! streams of both, until SIGINT or SIGTERM.

use anyhow::Result;
use demand_api::{api, config::ServiceConfig, startup};
use demand_lib::{health::HealthRegistry, observability::StructuredLogger};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting demand-api");

    let config = ServiceConfig::load()?;
    info!(
        port = config.api_port,
        model = %config.model_path.display(),
        metadata = %config.metadata_path.display(),
        "Service configured"
    );

    let health_registry = HealthRegistry::new();
    let logger = StructuredLogger::new("demand-api");
    let (shutdown_tx, _) = broadcast::channel(1);

    let state = startup::build_state(
        &config,
        health_registry.clone(),
        logger.clone(),
        shutdown_tx.clone(),
    )
    .await;

    logger.log_startup(
        SERVICE_VERSION,
        state.engine.forecaster().predictor().model_type(),
        &config.model_path.display().to_string(),
    );
    health_registry.set_ready(true).await;

    let cors_origins = config.cors_origin_list();
    let server_shutdown = shutdown_tx.clone();
    let server = tokio::spawn(async move {
        api::serve(config.api_port, state, &cors_origins, server_shutdown).await
    });

    let reason = shutdown_signal().await;
    logger.log_shutdown(reason);
    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());

    match server.await {
        Ok(Ok(())) => info!("Server drained"),
        Ok(Err(e)) => warn!(error = %e, "Server exited with error"),
        Err(e) => warn!(error = %e, "Server task panicked"),
    }

    Ok(())
}

async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT received",
        _ = terminate => "SIGTERM received",
    }
}
