//! Metrics collection and exposition.
//!
//! # Metrics
//! - `waf_requests_total` (counter): decisions by outcome and pipeline stage
//! - `waf_denylist_escalations_total` (counter): automatic bans by cause
//! - `waf_upstream_duration_seconds` (histogram): origin round-trip latency
//! - `waf_upstream_responses_total` (counter): origin responses by status
//! - `waf_upstream_failures_total` (counter): synthesized 500s by kind
//! - `waf_audit_write_failures_total` (counter): lost audit records
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::http::forward::ForwardError;
use crate::storage::Outcome;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_decision(outcome: Outcome, stage: &'static str) {
    metrics::counter!("waf_requests_total", "outcome" => outcome.as_str(), "stage" => stage)
        .increment(1);
}

pub fn record_escalation(cause: &'static str) {
    metrics::counter!("waf_denylist_escalations_total", "cause" => cause).increment(1);
}

pub fn record_upstream(status: u16, start: Instant) {
    metrics::histogram!("waf_upstream_duration_seconds").record(start.elapsed().as_secs_f64());
    metrics::counter!("waf_upstream_responses_total", "status" => status.to_string()).increment(1);
}

pub fn record_upstream_failure(error: &ForwardError) {
    let kind = match error {
        ForwardError::InvalidTarget(_) => "invalid_target",
        ForwardError::Upstream(_) => "connect",
        ForwardError::Timeout(_) => "timeout",
        ForwardError::Body(_) => "body",
    };
    metrics::counter!("waf_upstream_failures_total", "kind" => kind).increment(1);
}

pub fn record_audit_failure() {
    metrics::counter!("waf_audit_write_failures_total").increment(1);
}
