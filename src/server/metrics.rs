//! Prometheus metrics for lifeline
//!
//! Exposes request and lifecycle activity:
//! - Requests served or rejected during drain
//! - In-flight request count
//! - Current lifecycle phase
//! - Shutdown sequence instrumentation (drains started, timers armed, outcomes)

use crate::lifecycle::Phase;
use prometheus::{
    self, Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Service metrics registry
///
/// Thread-safe container for all Prometheus metrics.
/// Clone is cheap (Arc internally).
#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Registry,
    /// Requests by outcome (served, rejected)
    pub requests_total: IntCounterVec,
    /// Requests currently being handled
    pub in_flight_requests: IntGauge,
    /// One-hot gauge of the current phase
    pub phase: IntGaugeVec,
    /// Drain operations started
    pub drains_started_total: IntCounter,
    /// Shutdown deadline timers armed
    pub deadline_timers_armed_total: IntCounter,
    /// Shutdown outcomes (clean, deadline_exceeded, startup_failed, fault)
    pub shutdown_outcomes_total: IntCounterVec,
}

impl ServiceMetrics {
    /// Create a new metrics registry with all lifeline metrics
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("lifeline_requests_total", "Total number of gated requests"),
            &["outcome"], // served, rejected
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let in_flight_requests = IntGauge::new(
            "lifeline_in_flight_requests",
            "Number of requests currently in flight",
        )?;
        registry.register(Box::new(in_flight_requests.clone()))?;

        let phase = IntGaugeVec::new(
            Opts::new("lifeline_phase", "Current lifecycle phase (1 = active)"),
            &["phase"],
        )?;
        registry.register(Box::new(phase.clone()))?;

        let drains_started_total = IntCounter::new(
            "lifeline_drains_started_total",
            "Number of drain operations started",
        )?;
        registry.register(Box::new(drains_started_total.clone()))?;

        let deadline_timers_armed_total = IntCounter::new(
            "lifeline_deadline_timers_armed_total",
            "Number of shutdown deadline timers armed",
        )?;
        registry.register(Box::new(deadline_timers_armed_total.clone()))?;

        let shutdown_outcomes_total = IntCounterVec::new(
            Opts::new(
                "lifeline_shutdown_outcomes_total",
                "Process stop outcomes by kind",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(shutdown_outcomes_total.clone()))?;

        let metrics = Self {
            registry,
            requests_total,
            in_flight_requests,
            phase,
            drains_started_total,
            deadline_timers_armed_total,
            shutdown_outcomes_total,
        };
        metrics.set_phase(Phase::Starting);
        Ok(metrics)
    }

    /// Record a request that was let through the drain gate
    pub fn record_request_served(&self) {
        self.requests_total.with_label_values(&["served"]).inc();
    }

    /// Record a request turned away because the service is draining
    pub fn record_request_rejected(&self) {
        self.requests_total.with_label_values(&["rejected"]).inc();
    }

    /// Update the in-flight gauge
    pub fn set_in_flight(&self, count: usize) {
        self.in_flight_requests
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Mark `current` as the active phase
    pub fn set_phase(&self, current: Phase) {
        for phase in Phase::ALL {
            self.phase
                .with_label_values(&[phase.as_str()])
                .set(i64::from(phase == current));
        }
    }

    pub fn record_drain_started(&self) {
        self.drains_started_total.inc();
    }

    pub fn record_deadline_armed(&self) {
        self.deadline_timers_armed_total.inc();
    }

    /// Record how the process stopped
    pub fn record_shutdown_outcome(&self, outcome: &str) {
        self.shutdown_outcomes_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Encode all metrics to Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
        })
    }
}

/// Shared metrics handle
pub type SharedMetrics = Arc<ServiceMetrics>;

/// Create a new shared metrics instance
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    Ok(Arc::new(ServiceMetrics::new()?))
}
