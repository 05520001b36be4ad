//! Status HTTP server
//!
//! - `/health` - liveness with uptime
//! - `/ready` - 503 until startup marked the process ready
//! - `/metrics` - Prometheus text format

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use immunecore::metrics::Metrics;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Readiness flag flipped once every component is up
#[derive(Debug, Default)]
pub struct Readiness(AtomicBool);

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.0.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct StatusState {
    start_time: Instant,
    readiness: Arc<Readiness>,
    metrics: Arc<Metrics>,
}

pub fn router(metrics: Arc<Metrics>, readiness: Arc<Readiness>) -> Router {
    let state = StatusState {
        start_time: Instant::now(),
        readiness,
        metrics,
    };

    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(state)
}

/// Start the status HTTP server
///
/// # Arguments
/// * `addr` - Address to listen on
/// * `metrics` - Registry rendered at `/metrics`
/// * `readiness` - Flag backing `/ready`
/// * `shutdown` - Stops the server when cancelled
pub async fn serve(
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    readiness: Arc<Readiness>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    log::info!("Starting status server on http://{}", addr);
    log::info!("  /metrics - Prometheus metrics");
    log::info!("  /health  - Health check (liveness)");
    log::info!("  /ready   - Readiness check");

    axum::serve(listener, router(metrics, readiness))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

async fn metrics_handler(State(state): State<StatusState>) -> Response {
    match state.metrics.encode() {
        Ok((content_type, body)) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(e) => {
            log::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to encode metrics: {}", e)).into_response()
        }
    }
}

async fn health_handler(State(state): State<StatusState>) -> impl IntoResponse {
    let status = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "service": "immune",
        "version": env!("CARGO_PKG_VERSION"),
    });

    (StatusCode::OK, Json(status))
}

async fn ready_handler(State(state): State<StatusState>) -> impl IntoResponse {
    if !state.readiness.is_ready() {
        let status = serde_json::json!({
            "status": "starting",
            "message": "Service is still initializing"
        });
        return (StatusCode::SERVICE_UNAVAILABLE, Json(status));
    }

    (StatusCode::OK, Json(serde_json::json!({ "status": "ready" })))
}
