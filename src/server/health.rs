//! Health, metrics and service endpoints
//!
//! - `/health` - Liveness: Is the process alive?
//! - `/ready` - Readiness: Should the service receive traffic?
//! - `/metrics` - Prometheus metrics in text format
//! - `/` - Service info (drain-gated)
//!
//! Probes, `/metrics` and the 404 fallback are never drain-gated: they do no
//! real work and orchestrators keep polling them during shutdown.

use crate::config::Config;
use crate::lifecycle::LifecycleCoordinator;
use crate::server::drain::{drain_gate, InFlightTracker};
use crate::server::metrics::SharedMetrics;
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: LifecycleCoordinator,
    pub tracker: InFlightTracker,
    pub metrics: SharedMetrics,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        coordinator: LifecycleCoordinator,
        tracker: InFlightTracker,
        metrics: SharedMetrics,
        config: Config,
    ) -> Self {
        Self {
            coordinator,
            tracker,
            metrics,
            config: Arc::new(config),
        }
    }
}

/// Liveness probe handler
///
/// 200 in every phase short of STOPPED, independent of readiness.
async fn health(State(state): State<AppState>) -> Response {
    let liveness = state.coordinator.report_liveness();
    let status = if liveness.alive {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let mut body = json!({
        "status": if liveness.alive { "healthy" } else { "unhealthy" },
        "phase": liveness.phase,
        "uptime": liveness.uptime_secs,
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.config.environment,
        "instance": state.config.instance_id,
    });
    if let Some(ready_at) = liveness.ready_at {
        body["ready_at"] = json!(ready_at.to_rfc3339());
    }
    if let Some(memory) = liveness.memory {
        body["memory"] = json!(memory);
    }

    (status, Json(body)).into_response()
}

/// Readiness probe handler
///
/// Returns 200 only while READY, 503 otherwise.
async fn ready(State(state): State<AppState>) -> Response {
    if state.coordinator.report_readiness() {
        (StatusCode::OK, Json(json!({ "ready": true }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "ready": false,
                "phase": state.coordinator.phase(),
            })),
        )
            .into_response()
    }
}

/// Prometheus metrics handler
async fn metrics(State(state): State<AppState>) -> Response {
    state.metrics.set_in_flight(state.tracker.current());
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

/// Service info handler
async fn index(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "instance": state.config.instance_id,
    }))
}

async fn not_found(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not Found",
            "path": uri.path(),
        })),
    )
        .into_response()
}

/// Build the full router
pub fn build_router(state: AppState) -> Router {
    build_router_with(state, Router::new())
}

/// Build the full router with additional service routes
///
/// `routes` are drain-gated and counted as in-flight work, like `/`.
pub fn build_router_with(state: AppState, routes: Router<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .merge(routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), drain_gate))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(self::metrics))
        .fallback(not_found)
        .with_state(state)
}
