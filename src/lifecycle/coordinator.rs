//! Lifecycle coordinator
//!
//! Drives `ProcessState` through its phases and runs the bounded graceful
//! shutdown:
//! - `start` binds the listener and marks the service READY
//! - a termination signal withdraws readiness, starts the drain and arms a
//!   deadline timer
//! - whichever of drain completion / deadline reaches DRAINING -> STOPPED
//!   first decides the exit status; the other observes STOPPED and backs off
//! - after a clean stop, `finish_serving` lets the listener flush the last
//!   responses before the process exits

use crate::lifecycle::clock::{Clock, SystemClock};
use crate::lifecycle::diagnostics::{memory_snapshot, MemorySnapshot};
use crate::lifecycle::signal::TerminationSignal;
use crate::lifecycle::state::{Phase, ProcessState};
use crate::server::metrics::SharedMetrics;
use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot start service in phase {0}")]
    InvalidPhase(Phase),

    #[error("failed to register signal handlers: {0}")]
    Signal(#[source] std::io::Error),
}

/// How the process stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitOutcome {
    /// All in-flight requests finished before the deadline
    Clean,
    /// The grace period ran out with work still in flight
    DeadlineExceeded,
    /// The listening socket could not be bound
    StartupFailed,
    /// An uncaught runtime fault
    Fault,
}

impl ExitOutcome {
    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitOutcome::Clean => 0,
            ExitOutcome::DeadlineExceeded => 1,
            ExitOutcome::StartupFailed => 2,
            ExitOutcome::Fault => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExitOutcome::Clean => "clean",
            ExitOutcome::DeadlineExceeded => "deadline_exceeded",
            ExitOutcome::StartupFailed => "startup_failed",
            ExitOutcome::Fault => "fault",
        }
    }
}

/// Result of delivering a termination signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDisposition {
    /// This signal started the shutdown sequence
    Draining,
    /// A shutdown was already under way (or finished); nothing changed
    Ignored(Phase),
}

/// The work a shutdown waits on
///
/// Implemented by the HTTP layer's in-flight tracker; tests substitute
/// their own.
#[async_trait]
pub trait DrainTarget: Send + Sync {
    /// Resolve once nothing accepted before the drain is still running
    async fn drained(&self);

    /// Number of requests currently in flight
    fn in_flight(&self) -> usize;
}

/// Liveness report
#[derive(Debug, Clone, Serialize)]
pub struct Liveness {
    pub alive: bool,
    pub phase: Phase,
    pub uptime_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemorySnapshot>,
}

struct Inner {
    state: ProcessState,
    grace_period: Duration,
    drain_target: Arc<dyn DrainTarget>,
    metrics: SharedMetrics,
    clock: Arc<dyn Clock>,
    epoch: tokio::time::Instant,
    deadline_timer: CancellationToken,
    outcome: watch::Sender<Option<ExitOutcome>>,
    /// True while the listener task is running
    serving: watch::Sender<bool>,
}

/// Owner of the process lifecycle
///
/// Clone is cheap (Arc internally); all clones drive the same state.
#[derive(Clone)]
pub struct LifecycleCoordinator {
    inner: Arc<Inner>,
}

impl LifecycleCoordinator {
    /// Create a coordinator in STARTING
    pub fn new(
        grace_period: Duration,
        drain_target: Arc<dyn DrainTarget>,
        metrics: SharedMetrics,
    ) -> Self {
        Self::with_clock(grace_period, drain_target, metrics, Arc::new(SystemClock))
    }

    /// Create a coordinator with an explicit wall clock
    pub fn with_clock(
        grace_period: Duration,
        drain_target: Arc<dyn DrainTarget>,
        metrics: SharedMetrics,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (outcome, _) = watch::channel(None);
        let (serving, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: ProcessState::new(),
                grace_period,
                drain_target,
                metrics,
                clock,
                epoch: tokio::time::Instant::now(),
                deadline_timer: CancellationToken::new(),
                outcome,
                serving,
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.phase()
    }

    pub fn state(&self) -> &ProcessState {
        &self.inner.state
    }

    pub fn grace_period(&self) -> Duration {
        self.inner.grace_period
    }

    /// Whether newly arriving requests should be handled
    pub fn accepts_requests(&self) -> bool {
        self.phase() < Phase::Draining
    }

    /// Outcome, once the process has reached STOPPED
    pub fn outcome(&self) -> Option<ExitOutcome> {
        *self.inner.outcome.borrow()
    }

    /// Bind the listener on `port` and serve `app`
    ///
    /// On success the service is READY and the returned address is the one
    /// actually bound (useful with port 0). A bind failure is fatal: the
    /// state goes straight to STOPPED with `ExitOutcome::StartupFailed`.
    pub async fn start(&self, port: u16, app: Router) -> Result<SocketAddr, LifecycleError> {
        let phase = self.phase();
        if phase == Phase::Stopped {
            return Err(LifecycleError::InvalidPhase(phase));
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(source) => {
                error!(addr = %addr, error = %source, "Failed to bind listener");
                self.halt(ExitOutcome::StartupFailed);
                return Err(LifecycleError::Bind { addr, source });
            }
        };
        let local_addr = listener.local_addr().unwrap_or(addr);
        // Log after successful bind - server is actually listening
        info!(addr = %local_addr, "HTTP server listening");

        self.inner.serving.send_replace(true);
        let coordinator = self.clone();
        tokio::spawn(async move {
            let stopped = {
                let coordinator = coordinator.clone();
                async move {
                    coordinator.wait_stopped().await;
                }
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(stopped)
                .await
            {
                error!(error = %e, "HTTP server failed");
                coordinator.on_fault(&format!("HTTP server failed: {}", e));
            }
            // Graceful shutdown returns once every open connection is closed
            coordinator.inner.serving.send_replace(false);
            debug!("HTTP server closed");
        });

        if let Err(phase) = self.mark_ready() {
            // A signal beat us to it; keep serving so the drain can finish
            warn!(phase = %phase, "Listener bound after shutdown began, not marking ready");
        }

        Ok(local_addr)
    }

    /// STARTING -> READY
    ///
    /// Called by `start`; exposed for embedders that run their own listener.
    pub fn mark_ready(&self) -> Result<(), Phase> {
        let now = self.inner.clock.now();
        self.inner.state.mark_ready(now)?;
        self.inner.metrics.set_phase(Phase::Ready);
        info!(ready_at = %now.to_rfc3339(), "Service ready");
        Ok(())
    }

    /// Liveness: alive unless STOPPED, plus diagnostics
    ///
    /// Never suspends; diagnostics that cannot be collected are omitted.
    pub fn report_liveness(&self) -> Liveness {
        let state = &self.inner.state;
        Liveness {
            alive: state.is_alive(),
            phase: state.phase(),
            uptime_secs: self.inner.epoch.elapsed().as_secs_f64(),
            ready_at: state.ready_at(),
            memory: memory_snapshot(),
        }
    }

    /// Readiness: true only while READY
    pub fn report_readiness(&self) -> bool {
        self.inner.state.is_ready()
    }

    /// Handle SIGTERM / SIGINT
    ///
    /// Returns immediately. The first signal moves the service to DRAINING,
    /// spawns the drain and arms the deadline timer; later signals are
    /// no-ops and never restart the timer.
    pub fn on_termination_signal(&self, signal: TerminationSignal) -> SignalDisposition {
        let now = self.inner.clock.now();
        let deadline = chrono::Duration::from_std(self.inner.grace_period)
            .ok()
            .and_then(|grace| now.checked_add_signed(grace))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        match self.inner.state.begin_draining(signal, deadline) {
            Ok(previous) => {
                self.inner.metrics.set_phase(Phase::Draining);
                info!(
                    signal = %signal,
                    previous = %previous,
                    deadline = %deadline.to_rfc3339(),
                    grace_period_secs = self.inner.grace_period.as_secs_f64(),
                    in_flight = self.inner.drain_target.in_flight(),
                    "Draining: readiness withdrawn, waiting for in-flight requests"
                );
                self.spawn_drain();
                self.spawn_deadline_timer();
                SignalDisposition::Draining
            }
            Err(phase) => {
                info!(signal = %signal, phase = %phase, "Shutdown already in progress, ignoring signal");
                SignalDisposition::Ignored(phase)
            }
        }
    }

    fn spawn_drain(&self) {
        self.inner.metrics.record_drain_started();
        let coordinator = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = coordinator.inner.drain_target.drained() => {
                    coordinator.on_drain_complete();
                }
                _ = coordinator.wait_stopped() => {}
            }
        });
    }

    fn spawn_deadline_timer(&self) {
        self.inner.metrics.record_deadline_armed();
        let coordinator = self.clone();
        let cancelled = self.inner.deadline_timer.clone();
        let grace_period = self.inner.grace_period;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    debug!("Shutdown deadline timer cancelled");
                }
                _ = tokio::time::sleep(grace_period) => {
                    coordinator.on_deadline_elapsed();
                }
            }
        });
    }

    /// Drain finished: DRAINING -> STOPPED with a clean exit
    ///
    /// Returns false if the deadline (or a fault) already stopped the process.
    pub(crate) fn on_drain_complete(&self) -> bool {
        match self.inner.state.finish_draining() {
            Ok(_) => {
                self.inner.deadline_timer.cancel();
                info!(
                    drain_secs = self.draining_for().as_secs_f64(),
                    "All in-flight requests completed, stopping cleanly"
                );
                self.resolve(ExitOutcome::Clean);
                true
            }
            Err(phase) => {
                debug!(phase = %phase, "Drain completed after stop, ignoring");
                false
            }
        }
    }

    /// Deadline fired: DRAINING -> STOPPED with a forced exit
    ///
    /// Returns false if the drain already completed.
    pub(crate) fn on_deadline_elapsed(&self) -> bool {
        match self.inner.state.finish_draining() {
            Ok(_) => {
                error!(
                    in_flight = self.inner.drain_target.in_flight(),
                    grace_period_secs = self.inner.grace_period.as_secs_f64(),
                    "Shutdown deadline exceeded, forcing termination"
                );
                self.resolve(ExitOutcome::DeadlineExceeded);
                true
            }
            Err(phase) => {
                debug!(phase = %phase, "Deadline fired after stop, ignoring");
                false
            }
        }
    }

    /// Uncaught runtime fault: any live phase -> STOPPED
    pub fn on_fault(&self, message: &str) {
        error!(fault = %message, phase = %self.phase(), "Runtime fault");
        self.halt(ExitOutcome::Fault);
    }

    fn halt(&self, outcome: ExitOutcome) {
        if self.inner.state.halt().is_ok() {
            self.inner.deadline_timer.cancel();
            self.resolve(outcome);
        }
    }

    fn resolve(&self, outcome: ExitOutcome) {
        self.inner.metrics.set_phase(Phase::Stopped);
        self.inner
            .metrics
            .record_shutdown_outcome(outcome.as_str());
        self.inner.outcome.send_replace(Some(outcome));
    }

    fn draining_for(&self) -> Duration {
        self.inner
            .state
            .shutdown_deadline()
            .and_then(|deadline| {
                let started = deadline - chrono::Duration::from_std(self.inner.grace_period).ok()?;
                (self.inner.clock.now() - started).to_std().ok()
            })
            .unwrap_or_default()
    }

    /// Wait for the listener to close after a clean stop
    ///
    /// The drain completes when the last handler returns, which is before
    /// hyper has written that response to the socket. Graceful shutdown
    /// closes each connection once its response is flushed; this waits for
    /// that, bounded by what is left of the shutdown deadline. Returns false
    /// if connections were still open when the time ran out.
    pub async fn finish_serving(&self) -> bool {
        let budget = self
            .inner
            .state
            .shutdown_deadline()
            .map(|deadline| self.inner.clock.remaining_until(deadline))
            .unwrap_or_default();

        let mut rx = self.inner.serving.subscribe();
        let closed = tokio::time::timeout(budget, rx.wait_for(|serving| !*serving))
            .await
            .map(|result| result.is_ok())
            .unwrap_or(false);
        if !closed {
            warn!(
                budget_secs = budget.as_secs_f64(),
                "Connections still open at the shutdown deadline"
            );
        }
        closed
    }

    /// Wait until the process reaches STOPPED and return how it got there
    pub async fn wait_stopped(&self) -> ExitOutcome {
        let mut rx = self.inner.outcome.subscribe();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|outcome| *outcome);
        // The sender lives as long as `self`, so the wait cannot fail
        outcome.unwrap_or(ExitOutcome::Fault)
    }
}
