//! Metrics collection and exposition.
//!
//! # Metrics
//! - `stream_sessions_started_total` (counter): sessions opened, by endpoint
//! - `stream_sessions_active` (gauge): sessions not yet closed, by endpoint
//! - `stream_sessions_finished_total` (counter): by endpoint and outcome
//! - `stream_chunks_total` (counter): chunks written downstream, by endpoint
//!
//! Without an installed recorder the macros are no-ops, so tests need no setup.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_session_started(endpoint: &'static str) {
    metrics::counter!("stream_sessions_started_total", "endpoint" => endpoint).increment(1);
    metrics::gauge!("stream_sessions_active", "endpoint" => endpoint).increment(1.0);
}

pub fn record_session_finished(endpoint: &'static str, outcome: &'static str) {
    metrics::gauge!("stream_sessions_active", "endpoint" => endpoint).decrement(1.0);
    metrics::counter!(
        "stream_sessions_finished_total",
        "endpoint" => endpoint,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_chunk(endpoint: &'static str) {
    metrics::counter!("stream_chunks_total", "endpoint" => endpoint).increment(1);
}
