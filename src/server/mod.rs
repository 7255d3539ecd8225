//! HTTP surface: four JSON/multipart endpoints over the pipeline.
//!
//! | Route | Body | Answer |
//! |---|---|---|
//! | `POST /api/extract` | multipart `file` | `{text}` |
//! | `POST /api/process` | `{texts}` | `{data}` |
//! | `POST /api/download` | `{data}` | XLSX attachment |
//! | `POST /api/generate` | `{prompt, aspect_ratio?}` | `{success, output}` |
//! | `GET /health` | | `ok` |
//!
//! Handlers share nothing mutable: [`AppState`] is a bundle of `Arc`s.

pub mod error;
mod handlers;

pub use error::ApiError;
pub use handlers::{ExtractResponse, GenerateResponse, ProcessResponse};

use crate::config::ServiceConfig;
use crate::error::InvoiceError;
use crate::process::Services;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(services: Services, config: ServiceConfig) -> Self {
        Self {
            services,
            config: Arc::new(config),
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/api/extract", post(handlers::extract))
        .route("/api/process", post(handlers::process))
        .route("/api/download", post(handlers::download))
        .route("/api/generate", post(handlers::generate))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), InvoiceError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| InvoiceError::Internal(format!("Failed to bind {addr}: {e}")))?;
    let local = listener
        .local_addr()
        .map_err(|e| InvoiceError::Internal(format!("Failed to get server address: {e}")))?;

    info!(addr = %local, "Server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| InvoiceError::Internal(format!("Server error: {e}")))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
