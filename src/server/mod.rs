//! HTTP server for probes, metrics and service routes
//!
//! Provides orchestrator health probes:
//! - `/health` - Liveness probe (process is running)
//! - `/ready` - Readiness probe (service should receive traffic)
//!
//! Also provides the drain gate that turns away new requests during shutdown.

pub mod drain;
mod health;
pub mod metrics;

pub use drain::{draining_response, InFlightGuard, InFlightTracker};
pub use health::{build_router, build_router_with, AppState};
pub use metrics::{create_metrics, ServiceMetrics, SharedMetrics};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test_support;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "health_test.rs"]
mod health_tests;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "drain_test.rs"]
mod drain_tests;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "metrics_test.rs"]
mod metrics_tests;
