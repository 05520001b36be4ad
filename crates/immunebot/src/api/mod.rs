//! Certificates HTTP API
//!
//! - `GET /certs` - all certificates
//! - `POST /certs` - issue a certificate without a bot user
//! - `GET /certs/{code}` - certificate behind a QR code

pub mod error;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use immunecore::certs::CertificateService;
use immunecore::models::NewCertificate;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use error::ApiError;
pub use types::{CertificateView, NewCertificateData};

#[derive(Clone)]
struct ApiState {
    certs: Arc<dyn CertificateService>,
}

pub fn router(certs: Arc<dyn CertificateService>) -> Router {
    Router::new()
        .route("/certs", get(list_certificates).post(create_certificate))
        .route("/certs/{code}", get(certificate_by_code))
        .with_state(ApiState { certs })
}

/// Serves the API until `shutdown` is cancelled
pub async fn serve(addr: SocketAddr, certs: Arc<dyn CertificateService>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    log::info!("Starting API server on http://{}", addr);

    axum::serve(listener, router(certs))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    log::info!("API server stopped");
    Ok(())
}

async fn list_certificates(State(state): State<ApiState>) -> Result<Json<Vec<CertificateView>>, ApiError> {
    let certs = state.certs.list_certificates().await?;
    Ok(Json(certs.iter().map(CertificateView::from).collect()))
}

async fn certificate_by_code(
    State(state): State<ApiState>,
    Path(code): Path<String>,
) -> Result<Json<CertificateView>, ApiError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(ApiError::BadRequest("code not provided".to_string()));
    }

    let cert = state.certs.get_cert_by_code(code).await?;
    Ok(Json(CertificateView::from(&cert)))
}

async fn create_certificate(
    State(state): State<ApiState>,
    payload: Result<Json<NewCertificateData>, JsonRejection>,
) -> Result<(StatusCode, Json<CertificateView>), ApiError> {
    let Json(data) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let fields = data.validate();
    if !fields.is_empty() {
        return Err(ApiError::Validation(fields));
    }

    let cert = state
        .certs
        .create_vax_cert(NewCertificate {
            owner_id: None,
            credentials: data.into_credentials(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(CertificateView::from(&cert))))
}
