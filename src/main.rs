//! Data Science Pipelines Operator Entry Point
//!
//! Starts the Kubernetes controller and optional REST API server.

use std::sync::Arc;

use clap::Parser;
use pipelines_operator::config::OperatorConfig;
use pipelines_operator::{controller, Error};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = OperatorConfig::parse();

    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let fmt_layer = fmt::layer().with_target(true);

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    // Only enable OTEL if an endpoint is provided
    let otel_enabled = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok();

    if otel_enabled {
        let otel_layer = pipelines_operator::telemetry::init_telemetry(&registry)?;
        registry.with(otel_layer).init();
        info!("OpenTelemetry tracing initialized");
    } else {
        registry.init();
        info!("OpenTelemetry tracing disabled (OTEL_EXPORTER_OTLP_ENDPOINT not set)");
    }

    info!(
        "Starting Data Science Pipelines Operator v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        health_check_disabled = config.disable_database_health_check,
        timeout = ?config.db_connection_timeout,
        "Database health check settings"
    );

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    info!("Connected to Kubernetes cluster");

    let state = Arc::new(controller::ControllerState {
        client: client.clone(),
        config,
        probe: Arc::new(controller::MySqlProbe),
    });

    #[cfg(feature = "rest-api")]
    {
        let api_state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = pipelines_operator::rest_api::run_server(api_state).await {
                tracing::error!("REST API server error: {:?}", e);
            }
        });
    }

    let result = controller::run_controller(state).await;

    // Flush any remaining traces
    pipelines_operator::telemetry::shutdown_telemetry();

    result
}
