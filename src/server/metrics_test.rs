//! Tests for service metrics

use super::metrics::{create_metrics, ServiceMetrics};
use crate::lifecycle::Phase;

#[test]
fn test_metrics_creation() {
    let metrics = ServiceMetrics::new().expect("should create metrics");

    // Record some values so labelled metrics appear in output
    metrics.record_request_served();
    metrics.record_shutdown_outcome("clean");

    let output = metrics.encode().expect("should encode metrics");
    assert!(output.contains("lifeline_requests_total"));
    assert!(output.contains("lifeline_in_flight_requests"));
    assert!(output.contains("lifeline_phase"));
    assert!(output.contains("lifeline_drains_started_total"));
    assert!(output.contains("lifeline_deadline_timers_armed_total"));
    assert!(output.contains("lifeline_shutdown_outcomes_total"));
}

#[test]
fn test_new_metrics_start_in_starting_phase() {
    let metrics = ServiceMetrics::new().expect("should create metrics");

    let output = metrics.encode().expect("should encode metrics");
    assert!(output.contains("lifeline_phase{phase=\"STARTING\"} 1"));
    assert!(output.contains("lifeline_phase{phase=\"READY\"} 0"));
    assert!(output.contains("lifeline_phase{phase=\"DRAINING\"} 0"));
    assert!(output.contains("lifeline_phase{phase=\"STOPPED\"} 0"));
}

#[test]
fn test_set_phase_is_one_hot() {
    let metrics = ServiceMetrics::new().expect("should create metrics");

    metrics.set_phase(Phase::Draining);

    let output = metrics.encode().expect("should encode metrics");
    assert!(output.contains("lifeline_phase{phase=\"STARTING\"} 0"));
    assert!(output.contains("lifeline_phase{phase=\"DRAINING\"} 1"));
}

#[test]
fn test_request_outcomes() {
    let metrics = ServiceMetrics::new().expect("should create metrics");

    metrics.record_request_served();
    metrics.record_request_served();
    metrics.record_request_rejected();

    let output = metrics.encode().expect("should encode metrics");
    assert!(output.contains("lifeline_requests_total{outcome=\"served\"} 2"));
    assert!(output.contains("lifeline_requests_total{outcome=\"rejected\"} 1"));
}

#[test]
fn test_shutdown_instrumentation() {
    let metrics = ServiceMetrics::new().expect("should create metrics");

    metrics.record_drain_started();
    metrics.record_deadline_armed();
    metrics.record_shutdown_outcome("deadline_exceeded");
    metrics.set_in_flight(3);

    let output = metrics.encode().expect("should encode metrics");
    assert!(output.contains("lifeline_drains_started_total 1"));
    assert!(output.contains("lifeline_deadline_timers_armed_total 1"));
    assert!(output.contains("lifeline_shutdown_outcomes_total{outcome=\"deadline_exceeded\"} 1"));
    assert!(output.contains("lifeline_in_flight_requests 3"));
}

#[test]
fn test_create_shared_metrics() {
    let metrics = create_metrics().expect("should create shared metrics");

    // Verify Arc sharing works
    let metrics2 = metrics.clone();
    metrics.record_request_rejected();

    let output = metrics2.encode().expect("should encode from clone");
    assert!(output.contains("lifeline_requests_total{outcome=\"rejected\"} 1"));
}
