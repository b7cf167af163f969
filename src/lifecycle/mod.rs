//! Process lifecycle and graceful shutdown
//!
//! The coordinator owns the service phase (STARTING, READY, DRAINING,
//! STOPPED), reacts to SIGTERM/SIGINT by draining in-flight requests within a
//! bounded grace period, and decides the process exit status.

pub mod clock;
pub mod coordinator;
pub mod diagnostics;
pub mod fault;
pub mod signal;
pub mod state;

pub use coordinator::{
    DrainTarget, ExitOutcome, LifecycleCoordinator, LifecycleError, Liveness, SignalDisposition,
};
pub use fault::install_fault_handler;
pub use signal::{forward_signals, SignalListener, SignalSource, TerminationSignal};
pub use state::{Phase, ProcessState};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "state_test.rs"]
mod state_tests;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "coordinator_test.rs"]
mod coordinator_tests;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "signal_test.rs"]
mod signal_tests;
