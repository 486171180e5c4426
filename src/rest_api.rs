//! Health and metrics endpoints

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, routing::get, Router};
use tracing::info;

use crate::controller::ControllerState;
use crate::error::{Error, Result};

pub fn router(state: Arc<ControllerState>) -> Router {
    let router = Router::new().route("/healthz", get(healthz));
    #[cfg(feature = "metrics")]
    let router = router.route("/metrics", get(metrics));
    router.with_state(state)
}

/// Serve the router on `0.0.0.0:<api_port>` until the process exits
pub async fn run_server(state: Arc<ControllerState>) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.api_port));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::ConfigError(format!("failed to bind {}: {}", addr, e)))?;
    info!("REST API listening on http://{}", addr);
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::ConfigError(format!("REST API server failed: {}", e)))
}

async fn healthz(State(_state): State<Arc<ControllerState>>) -> &'static str {
    "ok"
}

#[cfg(feature = "metrics")]
async fn metrics() -> (axum::http::StatusCode, String) {
    use axum::http::StatusCode;

    match crate::controller::metrics::encode() {
        Ok(body) => (StatusCode::OK, body),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error encoding metrics".to_string(),
        ),
    }
}
