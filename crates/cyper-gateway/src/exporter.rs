//! Prometheus scrape endpoint.

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use cyper_metrics::{SharedMetricsRegistry, TEXT_CONTENT_TYPE};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::GatewayResult;

async fn render(State(registry): State<SharedMetricsRegistry>) -> Response {
    match registry.encode_text() {
        Ok(body) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)], body).into_response()
        },
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        },
    }
}

/// Routes served by the exporter.
#[must_use]
pub fn router(registry: SharedMetricsRegistry) -> Router {
    Router::new()
        .route("/metrics", get(render))
        .with_state(registry)
}

/// Serve `GET /metrics` on `listener` until `cancel` fires.
///
/// # Errors
///
/// Returns an IO error if the listener fails.
pub async fn serve_metrics(
    listener: TcpListener,
    registry: SharedMetricsRegistry,
    cancel: CancellationToken,
) -> GatewayResult<()> {
    info!(addr = %listener.local_addr()?, "Metrics exporter started");
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    info!("Metrics exporter stopped");
    Ok(())
}
