//! Wall clock for the lifecycle
//!
//! The coordinator reads wall time in three places: stamping `ready_at` when
//! the service turns READY, computing `shutdown_deadline` (signal time plus
//! the grace period) when DRAINING begins, and working out how much of that
//! deadline is left once the drain is done and open connections are being
//! flushed. All three go through a `Clock` so tests can pin the timestamps
//! exactly. The deadline timer itself sleeps on tokio time, which tests pause.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Source of wall-clock time for lifecycle timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Time left until `deadline`, zero once it has passed
    fn remaining_until(&self, deadline: DateTime<Utc>) -> Duration {
        (deadline - self.now()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Production clock that delegates to `chrono::Utc::now()`
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for testing with controllable time
#[cfg(test)]
#[allow(clippy::expect_used)]
pub struct MockClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl MockClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.lock().expect("MockClock lock poisoned");
        *now += duration;
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("MockClock lock poisoned")
    }
}
