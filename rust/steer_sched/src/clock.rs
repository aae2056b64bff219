//! Time sources for the scheduler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::types::TimeNs;

/// Monotonic nanosecond clock.
pub trait Clock: Send + Sync {
    fn now_ns(&self) -> TimeNs;
}

/// Wall-clock time since construction.
#[derive(Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> TimeNs {
        u64::try_from(self.start.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Clock that only moves when told to. Used to drive deterministic runs.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `ns` and return the new time.
    pub fn advance(&self, ns: TimeNs) -> TimeNs {
        self.now.fetch_add(ns, Ordering::Relaxed) + ns
    }

    /// Jump to `ns`. Going backwards is ignored.
    pub fn set(&self, ns: TimeNs) {
        self.now.fetch_max(ns, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> TimeNs {
        self.now.load(Ordering::Relaxed)
    }
}
