//! Helpers for tests that run the real HTTP server

use super::{build_router_with, create_metrics, AppState, InFlightTracker, SharedMetrics};
use crate::config::Config;
use crate::lifecycle::LifecycleCoordinator;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_RETRY_AFTER: Duration = Duration::from_secs(5);

/// A running service bound to an ephemeral port
pub struct TestService {
    pub coordinator: LifecycleCoordinator,
    pub tracker: InFlightTracker,
    pub metrics: SharedMetrics,
    pub addr: SocketAddr,
    pub client: reqwest::Client,
}

impl TestService {
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.addr.port(), path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .expect("request should reach the server")
    }

    /// Wait until `n` requests are in flight
    pub async fn wait_for_in_flight(&self, n: usize) {
        for _ in 0..200 {
            if self.tracker.current() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} in-flight requests, have {}",
            n,
            self.tracker.current()
        );
    }
}

/// Start a service with the given grace period and extra gated routes
pub async fn spawn_service(grace_period: Duration, routes: Router<AppState>) -> TestService {
    let metrics = create_metrics().expect("should create metrics");
    let tracker = InFlightTracker::new();
    let coordinator =
        LifecycleCoordinator::new(grace_period, Arc::new(tracker.clone()), metrics.clone());

    let config = Config {
        port: 0,
        grace_period,
        retry_after: TEST_RETRY_AFTER,
        environment: "test".to_string(),
        instance_id: "lifeline-test".to_string(),
        ..Config::default()
    };
    let state = AppState::new(coordinator.clone(), tracker.clone(), metrics.clone(), config);
    let addr = coordinator
        .start(0, build_router_with(state, routes))
        .await
        .expect("should bind ephemeral port");

    let service = TestService {
        coordinator,
        tracker,
        metrics,
        addr,
        client: reqwest::Client::new(),
    };
    wait_for_server(&service, 10).await;
    service
}

/// Wait for server to answer with retry logic
///
/// Retries connection up to max_retries times with exponential backoff.
async fn wait_for_server(service: &TestService, max_retries: u32) {
    let mut delay = Duration::from_millis(10);

    for attempt in 1..=max_retries {
        match service
            .client
            .get(service.url("/health"))
            .timeout(Duration::from_millis(100))
            .send()
            .await
        {
            Ok(_) => return,
            Err(_) if attempt < max_retries => {
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_millis(200));
            }
            Err(e) => panic!("Server not ready after {} attempts: {}", max_retries, e),
        }
    }
}
