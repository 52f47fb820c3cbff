//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pipeline_responses_total` (counter): responses by `action`
//! - `pipeline_rewrites_total` (counter): resource references rewritten
//! - `pipeline_transform_errors_total` (counter): aborted response bodies
//!
//! Without an installed recorder these calls are no-ops.

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_action(action: &'static str) {
    counter!("pipeline_responses_total", "action" => action).increment(1);
}

pub fn record_rewrites(count: usize) {
    if count > 0 {
        counter!("pipeline_rewrites_total").increment(count as u64);
    }
}

pub fn record_transform_error() {
    counter!("pipeline_transform_errors_total").increment(1);
}
