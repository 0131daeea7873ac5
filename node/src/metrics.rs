//! # Prometheus Metrics
//!
//! Operational counters for the node, scraped at `/metrics` on the
//! configured metrics port. Registered in a dedicated registry so nothing
//! collides with a default global registry consumer.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Challenges issued via `GET /api`.
    pub challenges_issued_total: IntCounter,
    /// Successful binding updates via `POST /api`.
    pub updates_total: IntCounter,
    /// Successful revocations via `DELETE /api`.
    pub revocations_total: IntCounter,
    /// Requests rejected by response validation.
    pub auth_failures_total: IntCounter,
    /// Store operations that failed and surfaced a server error.
    pub store_errors_total: IntCounter,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("sigil".into()), None)
            .expect("failed to create prometheus registry");

        let challenges_issued_total =
            IntCounter::new("challenges_issued_total", "Challenges issued to clients")
                .expect("metric creation");
        registry
            .register(Box::new(challenges_issued_total.clone()))
            .expect("metric registration");

        let updates_total =
            IntCounter::new("updates_total", "Successful binding updates").expect("metric creation");
        registry
            .register(Box::new(updates_total.clone()))
            .expect("metric registration");

        let revocations_total = IntCounter::new("revocations_total", "Successful revocations")
            .expect("metric creation");
        registry
            .register(Box::new(revocations_total.clone()))
            .expect("metric registration");

        let auth_failures_total = IntCounter::new(
            "auth_failures_total",
            "Requests rejected by challenge-response validation",
        )
        .expect("metric creation");
        registry
            .register(Box::new(auth_failures_total.clone()))
            .expect("metric registration");

        let store_errors_total = IntCounter::new(
            "store_errors_total",
            "Binding store operations that failed",
        )
        .expect("metric creation");
        registry
            .register(Box::new(store_errors_total.clone()))
            .expect("metric registration");

        Self {
            registry,
            challenges_issued_total,
            updates_total,
            revocations_total,
            auth_failures_total,
            store_errors_total,
        }
    }

    /// Encodes all registered metrics into the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics handle passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler rendering `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
