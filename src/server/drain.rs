//! In-flight request tracking and the drain gate
//!
//! Every gated request holds an `InFlightGuard` for as long as its handler
//! runs. Once the coordinator leaves READY, newly arriving requests are
//! answered with 503 + `Retry-After` instead of being queued, so the drain
//! only ever waits on work accepted before the signal.

use crate::lifecycle::DrainTarget;
use crate::server::health::AppState;
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{header::RETRY_AFTER, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Counts requests currently being handled
///
/// Clone is cheap (Arc internally).
#[derive(Debug, Clone)]
pub struct InFlightTracker {
    count: Arc<watch::Sender<usize>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            count: Arc::new(count),
        }
    }

    /// Register a request; it stays in flight until the guard is dropped
    pub fn enter(&self) -> InFlightGuard {
        self.count.send_modify(|n| *n += 1);
        InFlightGuard {
            count: self.count.clone(),
        }
    }

    pub fn current(&self) -> usize {
        *self.count.borrow()
    }

    /// Watch the in-flight count
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.count.subscribe()
    }

    /// Wait until no request is in flight
    pub async fn wait_idle(&self) {
        let mut rx = self.count.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for InFlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DrainTarget for InFlightTracker {
    async fn drained(&self) {
        self.wait_idle().await;
    }

    fn in_flight(&self) -> usize {
        self.current()
    }
}

/// Marks one request as in flight until dropped
#[derive(Debug)]
pub struct InFlightGuard {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.count.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// 503 response for requests arriving while draining
pub fn draining_response(retry_after: Duration) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(RETRY_AFTER, retry_after.as_secs().max(1).to_string())],
        Json(json!({
            "error": "Service Unavailable",
            "message": "Server is shutting down",
        })),
    )
        .into_response()
}

/// Middleware gating service routes on the lifecycle phase
///
/// Requests arriving after draining began are turned away without touching
/// the in-flight count, so rejected traffic cannot hold the count above zero.
/// The phase is checked again after registering: a request either registers
/// before draining starts (and the drain waits for it) or sees DRAINING and
/// is turned away.
pub async fn drain_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.coordinator.accepts_requests() {
        return reject(&state, &request);
    }

    let guard = state.tracker.enter();
    if !state.coordinator.accepts_requests() {
        // Draining began between the check and the registration
        drop(guard);
        return reject(&state, &request);
    }

    state.metrics.record_request_served();
    state.metrics.set_in_flight(state.tracker.current());
    let response = next.run(request).await;
    drop(guard);
    state.metrics.set_in_flight(state.tracker.current());

    response
}

fn reject(state: &AppState, request: &Request) -> Response {
    state.metrics.record_request_rejected();
    debug!(
        method = %request.method(),
        path = %request.uri().path(),
        phase = %state.coordinator.phase(),
        "Rejecting request during shutdown"
    );
    draining_response(state.config.retry_after)
}
