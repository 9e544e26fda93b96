//! HTTP server for the log ingestion and search service.
//!
//! Exposes the upload/status/search/summary/export surface under `/logs`,
//! plus Prometheus metrics and health probes.

mod config;
mod error;
pub mod handlers;
mod http;
pub mod metrics;
mod middleware;

pub use config::{CliArgs, ServerConfig};
pub use error::ApiError;
pub use handlers::AppState;
pub use http::LogServer;
