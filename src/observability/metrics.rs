//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define inspector metrics (messages, parse errors, evictions, flows)
//! - Expose a Prometheus-compatible scrape endpoint when enabled
//!
//! # Metrics
//! - `inspector_messages_total` (counter): messages stored, by kind
//! - `inspector_parse_errors_total` (counter): framing errors that forced a resync
//! - `inspector_store_evictions_total` (counter): entries evicted, by what
//! - `inspector_flows_total` (counter): flows opened
//! - `inspector_active_flows` (gauge): flows currently tracked
//! - `inspector_stream_errors_total` (counter): flows ended by reassembly loss
//!
//! # Design Decisions
//! - Recording is always safe; without an installed recorder it is a no-op
//! - Labels are static strings only

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::message::MessageKind;

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_message(kind: MessageKind) {
    counter!("inspector_messages_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_parse_error() {
    counter!("inspector_parse_errors_total").increment(1);
}

/// `what` is `"message"` or `"pair"`.
pub fn record_eviction(what: &'static str) {
    counter!("inspector_store_evictions_total", "what" => what).increment(1);
}

pub fn record_flow_opened() {
    counter!("inspector_flows_total").increment(1);
    gauge!("inspector_active_flows").increment(1.0);
}

pub fn record_flow_closed() {
    gauge!("inspector_active_flows").decrement(1.0);
}

pub fn record_stream_error() {
    counter!("inspector_stream_errors_total").increment(1);
}
