//! Prometheus metrics
//!
//! - Lifecycle operations by outcome
//! - Identifier collisions seen during allocation
//! - Keys removed by expiry

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    pub static ref OPERATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("snipbin_operations_total", "Snippet lifecycle operations"),
        &["op", "status"]
    ).unwrap();

    pub static ref ALLOCATION_COLLISIONS: IntCounter = IntCounter::new(
        "snipbin_allocation_collisions_total",
        "Generated identifiers that were already taken"
    ).unwrap();

    pub static ref EXPIRED_KEYS: IntCounter = IntCounter::new(
        "snipbin_expired_keys_total",
        "Keys removed because their TTL elapsed"
    ).unwrap();
}

/// Register all metrics with the global registry
pub fn init_metrics() {
    info!("Initializing Prometheus metrics");

    METRICS_REGISTRY.register(Box::new(OPERATIONS_TOTAL.clone())).ok();
    METRICS_REGISTRY.register(Box::new(ALLOCATION_COLLISIONS.clone())).ok();
    METRICS_REGISTRY.register(Box::new(EXPIRED_KEYS.clone())).ok();
}

/// Count one lifecycle operation
pub fn record_operation(op: &str, status: &str) {
    OPERATIONS_TOTAL.with_label_values(&[op, status]).inc();
}

/// Render the registry in Prometheus text format
pub fn export_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}
