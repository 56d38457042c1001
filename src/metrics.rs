//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Gate Metrics
    pub static ref GATE_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gitgate_gate_decisions_total", "Total number of authorization gate decisions"),
        &["decision"]
    ).expect("metric can be created");
    pub static ref IDENTITY_FETCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gitgate_identity_fetches_total", "Total number of GitHub identity fetch attempts"),
        &["outcome"]
    ).expect("metric can be created");

    // Upstream Metrics
    pub static ref UPSTREAM_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gitgate_upstream_requests_total", "Total number of upstream GitHub requests"),
        &["endpoint", "status"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gitgate_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; instruments are registered on the first call.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(GATE_DECISIONS_TOTAL.clone()))
            .expect("GATE_DECISIONS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(IDENTITY_FETCHES_TOTAL.clone()))
            .expect("IDENTITY_FETCHES_TOTAL can be registered");
        REGISTRY
            .register(Box::new(UPSTREAM_REQUESTS_TOTAL.clone()))
            .expect("UPSTREAM_REQUESTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}
