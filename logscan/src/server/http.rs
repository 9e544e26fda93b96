//! Router assembly and server lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::config::ServerConfig;
use super::handlers::{self, AppState};
use super::middleware::{MetricsLayer, TracingLayer};

/// The HTTP server wrapping the ingestion and query services.
pub struct LogServer {
    state: AppState,
    config: ServerConfig,
}

impl LogServer {
    pub fn new(state: AppState, config: ServerConfig) -> Self {
        Self { state, config }
    }

    /// Builds the application router.
    pub fn router(&self) -> Router {
        // Multipart framing adds overhead beyond the raw file cap.
        let body_limit = (self.state.config.file.max_size as usize).saturating_add(1024 * 1024);

        Router::new()
            .route("/logs/upload", post(handlers::upload))
            .route("/logs/status/{job_id}", get(handlers::status))
            .route("/logs/result/{job_id}", get(handlers::result))
            .route(
                "/logs/search",
                post(handlers::search_post).get(handlers::search_get),
            )
            .route("/logs/job/{job_id}/summary", get(handlers::summary))
            .route("/logs/job/{job_id}/levels", get(handlers::levels))
            .route("/logs/job/{job_id}/timeline", get(handlers::timeline))
            .route("/logs/job/{job_id}/fields", get(handlers::fields))
            .route(
                "/logs/job/{job_id}/fields/{field_name}",
                get(handlers::field_values),
            )
            .route(
                "/logs/job/{job_id}/context/{line_number}",
                get(handlers::context),
            )
            .route(
                "/logs/job/{job_id}/export",
                post(handlers::export_post).get(handlers::export_get),
            )
            .route("/metrics", get(handlers::metrics))
            .route("/-/healthy", get(handlers::healthy))
            .route("/-/ready", get(handlers::ready))
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(CorsLayer::permissive())
            .layer(TracingLayer::new())
            .layer(MetricsLayer::new(Arc::clone(&self.state.metrics)))
            .with_state(self.state.clone())
    }

    /// Binds the listener and serves until shutdown.
    pub async fn run(self) -> std::io::Result<()> {
        let app = self.router();
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        info!(%addr, "starting log service");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("server shut down gracefully");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
