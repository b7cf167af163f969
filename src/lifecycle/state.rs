//! Process lifecycle state
//!
//! `ProcessState` is the only shared mutable state of the service. The phase
//! moves one way, STARTING -> READY -> DRAINING -> STOPPED, and every move is
//! a compare-and-swap so concurrent callers (signal task, drain task,
//! deadline timer) resolve deterministically: the first to observe an
//! eligible phase wins, everyone else sees the updated phase and backs off.

use crate::lifecycle::signal::TerminationSignal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

/// Discrete lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Phase {
    Starting = 0,
    Ready = 1,
    Draining = 2,
    Stopped = 3,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::Starting,
        Phase::Ready,
        Phase::Draining,
        Phase::Stopped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Starting => "STARTING",
            Phase::Ready => "READY",
            Phase::Draining => "DRAINING",
            Phase::Stopped => "STOPPED",
        }
    }

    fn from_u8(raw: u8) -> Phase {
        match raw {
            0 => Phase::Starting,
            1 => Phase::Ready,
            2 => Phase::Draining,
            _ => Phase::Stopped,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared lifecycle state
///
/// Owned by the `LifecycleCoordinator`; nothing else holds a mutable path
/// to it. Timestamps are write-once cells, so "set exactly once" holds even
/// if a caller bypasses the phase guard by mistake.
#[derive(Debug)]
pub struct ProcessState {
    phase: AtomicU8,
    ready_at: OnceLock<DateTime<Utc>>,
    shutdown_signal: OnceLock<TerminationSignal>,
    shutdown_deadline: OnceLock<DateTime<Utc>>,
}

impl ProcessState {
    /// Create a new state in STARTING
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Starting as u8),
            ready_at: OnceLock::new(),
            shutdown_signal: OnceLock::new(),
            shutdown_deadline: OnceLock::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Liveness: anything short of STOPPED
    pub fn is_alive(&self) -> bool {
        self.phase() != Phase::Stopped
    }

    /// Readiness: READY only
    pub fn is_ready(&self) -> bool {
        self.phase() == Phase::Ready
    }

    pub fn ready_at(&self) -> Option<DateTime<Utc>> {
        self.ready_at.get().copied()
    }

    pub fn shutdown_signal(&self) -> Option<TerminationSignal> {
        self.shutdown_signal.get().copied()
    }

    pub fn shutdown_deadline(&self) -> Option<DateTime<Utc>> {
        self.shutdown_deadline.get().copied()
    }

    /// Move to `to` if the current phase is one of `from`
    ///
    /// Returns `Ok(previous)` when this call performed the transition, or
    /// `Err(current)` when the phase was not eligible. `to` must be later
    /// than every phase in `from`.
    pub(crate) fn transition(&self, from: &[Phase], to: Phase) -> Result<Phase, Phase> {
        debug_assert!(from.iter().all(|f| *f < to), "transitions are forward only");

        let mut current = self.phase();
        loop {
            if !from.contains(&current) {
                return Err(current);
            }
            match self.phase.compare_exchange(
                current as u8,
                to as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(current),
                Err(actual) => current = Phase::from_u8(actual),
            }
        }
    }

    /// STARTING -> READY, recording `readyAt`
    pub(crate) fn mark_ready(&self, now: DateTime<Utc>) -> Result<(), Phase> {
        self.transition(&[Phase::Starting], Phase::Ready)?;
        let _ = self.ready_at.set(now);
        Ok(())
    }

    /// STARTING/READY -> DRAINING, recording the signal and the deadline
    pub(crate) fn begin_draining(
        &self,
        signal: TerminationSignal,
        deadline: DateTime<Utc>,
    ) -> Result<Phase, Phase> {
        let previous = self.transition(&[Phase::Starting, Phase::Ready], Phase::Draining)?;
        let _ = self.shutdown_signal.set(signal);
        let _ = self.shutdown_deadline.set(deadline);
        Ok(previous)
    }

    /// DRAINING -> STOPPED
    pub(crate) fn finish_draining(&self) -> Result<Phase, Phase> {
        self.transition(&[Phase::Draining], Phase::Stopped)
    }

    /// Any live phase -> STOPPED (startup failure, runtime fault)
    pub(crate) fn halt(&self) -> Result<Phase, Phase> {
        self.transition(
            &[Phase::Starting, Phase::Ready, Phase::Draining],
            Phase::Stopped,
        )
    }
}

impl Default for ProcessState {
    fn default() -> Self {
        Self::new()
    }
}
