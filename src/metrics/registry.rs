use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Histogram bucket boundaries for latency metrics (seconds).
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Thin handle around the global metrics recorder.
///
/// After `Metrics::install()` the `metrics` crate macros (`counter!`, `gauge!`,
/// `histogram!`) can be used anywhere in the codebase. The `PrometheusHandle`
/// is retained solely for rendering the `/metrics` endpoint.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register metric descriptions.
    ///
    /// Must be called **once** at startup before any `counter!` / `gauge!` /
    /// `histogram!` calls.
    pub fn install() -> Self {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
                LATENCY_BUCKETS,
            )
            .expect("valid matcher")
            .install_recorder()
            .expect("failed to install metrics recorder");

        describe_counter!(
            "router_requests_total",
            Unit::Count,
            "Total requests accepted by the proxy listener"
        );
        describe_counter!(
            "router_bad_requests_total",
            Unit::Count,
            "Requests for which no eligible backend existed"
        );
        describe_counter!(
            "router_backend_requests_total",
            Unit::Count,
            "Total requests dispatched to a backend"
        );
        describe_counter!(
            "router_backend_errors_total",
            Unit::Count,
            "Backend round-trips that ended in an error"
        );
        describe_histogram!(
            "router_backend_response_duration_seconds",
            Unit::Seconds,
            "Time spent waiting for a backend response"
        );
        describe_gauge!(
            "router_connections_active",
            Unit::Count,
            "Number of active downstream connections"
        );

        Self { handle }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
