//! Prometheus metrics for the service.

use axum::http::Method;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

/// Labels for HTTP request metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    pub method: HttpMethod,
    pub endpoint: String,
    pub status: u16,
}

/// HTTP method label value.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Other,
}

impl From<&Method> for HttpMethod {
    fn from(method: &Method) -> Self {
        match *method {
            Method::GET => HttpMethod::Get,
            Method::POST => HttpMethod::Post,
            Method::PUT => HttpMethod::Put,
            Method::DELETE => HttpMethod::Delete,
            _ => HttpMethod::Other,
        }
    }
}

/// Container for all Prometheus metrics.
pub struct Metrics {
    registry: Registry,

    /// Counter of HTTP requests by method, endpoint, and status.
    pub http_requests_total: Family<HttpLabels, Counter>,

    /// Counter of accepted upload jobs.
    pub uploads_accepted_total: Counter,

    /// Counter of executed search requests.
    pub searches_total: Counter,

    /// Counter of export downloads.
    pub exports_total: Counter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics registry with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_requests_total = Family::<HttpLabels, Counter>::default();
        registry.register(
            "http_requests_total",
            "Total number of HTTP requests",
            http_requests_total.clone(),
        );

        let uploads_accepted_total = Counter::default();
        registry.register(
            "uploads_accepted_total",
            "Total number of log uploads accepted for ingestion",
            uploads_accepted_total.clone(),
        );

        let searches_total = Counter::default();
        registry.register(
            "searches_total",
            "Total number of search requests executed",
            searches_total.clone(),
        );

        let exports_total = Counter::default();
        registry.register(
            "exports_total",
            "Total number of export downloads rendered",
            exports_total.clone(),
        );

        Self {
            registry,
            http_requests_total,
            uploads_accepted_total,
            searches_total,
            exports_total,
        }
    }

    /// Encode all metrics to Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry)
            .expect("encoding metrics should not fail");
        buffer
    }
}
