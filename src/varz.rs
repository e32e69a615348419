//! Varz sink — the statistics collaborator the dispatcher reports every
//! request outcome to, exactly once. Interface only per spec (§2); this
//! binary backs it with the `metrics` crate, the same ambient stack this
//! codebase family uses for its Prometheus exposition (`metrics::registry`).

use crate::registry::Backend;
use std::time::Duration;

/// Per-request observation events. Capture calls must be non-blocking —
/// fire-and-forget — so the dispatcher never awaits them.
pub trait Varz: Send + Sync {
    /// No eligible backend was found for the request.
    fn capture_bad_request(&self);

    /// A request was dispatched to `backend`.
    fn capture_backend_request(&self, backend: &Backend);

    /// The backend round-trip finished (or failed) after `latency`.
    /// `error` carries a short description on failure, `None` on success.
    fn capture_backend_response(&self, backend: &Backend, error: Option<&str>, latency: Duration);
}

/// `metrics`-crate-backed Varz sink.
#[derive(Debug, Clone, Default)]
pub struct MetricsVarz;

impl MetricsVarz {
    pub fn new() -> Self {
        Self
    }
}

impl Varz for MetricsVarz {
    fn capture_bad_request(&self) {
        metrics::counter!("router_bad_requests_total").increment(1);
    }

    fn capture_backend_request(&self, backend: &Backend) {
        metrics::counter!(
            "router_backend_requests_total",
            "backend_addr" => backend.address.clone(),
        )
        .increment(1);
    }

    fn capture_backend_response(&self, backend: &Backend, error: Option<&str>, latency: Duration) {
        let status = if error.is_some() { "error" } else { "ok" };
        metrics::histogram!(
            "router_backend_response_duration_seconds",
            "backend_addr" => backend.address.clone(),
            "status" => status,
        )
        .record(latency.as_secs_f64());

        if let Some(err) = error {
            metrics::counter!(
                "router_backend_errors_total",
                "backend_addr" => backend.address.clone(),
            )
            .increment(1);
            tracing::warn!(
                backend_addr = %backend.address,
                error = err,
                "varz: backend response error"
            );
        }
    }
}
