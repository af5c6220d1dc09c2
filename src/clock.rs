//! Clock abstractions used by the sliding windows and the failure tracker.
//!
//! Everything time-based in the admission layer reads "now" through a [`Clock`] so tests can
//! drive a [`ManualClock`] instead of waiting on real time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Clock abstraction so timing can be faked in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_millis(&self) -> u64;
}

/// Monotonic clock backed by `Instant::now()`.
///
/// Notes: resets when the process restarts. Rate-limit state is process-lifetime only, so
/// nothing here needs to survive a restart.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Manually advanced clock for simulated time.
///
/// Clones share the same underlying instant, so a test can hand one clone to the controller and
/// keep another to move time forward.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the clock at an arbitrary offset (useful when zero has special meaning to a test).
    pub fn starting_at(start: Duration) -> Self {
        let clock = Self::new();
        clock.set(start);
        clock
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| Some(cur.saturating_add(millis)));
    }

    /// Jump to an absolute instant.
    pub fn set(&self, at: Duration) {
        self.now.store(u64::try_from(at.as_millis()).unwrap_or(u64::MAX), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_and_shares_state() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        assert_eq!(clock.now_millis(), 0);
        handle.advance(Duration::from_millis(1500));
        assert_eq!(clock.now_millis(), 1500);
        handle.set(Duration::from_secs(10));
        assert_eq!(clock.now_millis(), 10_000);
    }

    #[test]
    fn manual_clock_saturates() {
        let clock = ManualClock::starting_at(Duration::from_millis(u64::MAX - 1));
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now_millis(), u64::MAX);
    }

    #[test]
    fn monotonic_clock_moves_forward() {
        let clock = MonotonicClock::default();
        let first = clock.now_millis();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.now_millis() >= first);
    }
}
