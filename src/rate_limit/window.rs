//! Sliding window counter.
//!
//! Tracks the instant of every admission inside a trailing window. The struct is plain data:
//! callers pass "now" in milliseconds and own the locking (see
//! [`CategoryRegistry`](super::registry::CategoryRegistry)).
//!
//! An admission stamped at `t` expires once `now - t >= window`, so after a full window has
//! elapsed the slot is usable again and [`SlidingWindowLimit::time_until_reset`] reaches zero at
//! the same instant.

use std::collections::VecDeque;
use std::time::Duration;

/// A single sliding-window limit: at most `capacity` admissions per `window`.
#[derive(Debug, Clone)]
pub struct SlidingWindowLimit {
    capacity: u32,
    window: Duration,
    // oldest first
    admissions: VecDeque<u64>,
}

impl SlidingWindowLimit {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self { capacity, window, admissions: VecDeque::with_capacity(capacity as usize) }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Prune expired admissions, then report whether one more fits.
    ///
    /// Pruning here is intentional: it keeps the front of the queue meaningful for
    /// [`time_until_reset`](Self::time_until_reset).
    pub fn is_allowed(&mut self, now_millis: u64) -> bool {
        self.prune(now_millis);
        self.admissions.len() < self.capacity as usize
    }

    /// Append an admission at `now_millis`. Never enforces capacity; check
    /// [`is_allowed`](Self::is_allowed) first.
    pub fn record(&mut self, now_millis: u64) {
        self.admissions.push_back(now_millis);
    }

    /// Time until the oldest retained admission leaves the window. Zero when empty.
    pub fn time_until_reset(&self, now_millis: u64) -> Duration {
        match self.admissions.front() {
            None => Duration::ZERO,
            Some(&oldest) => {
                let reset_at = oldest.saturating_add(self.window_millis());
                Duration::from_millis(reset_at.saturating_sub(now_millis))
            }
        }
    }

    /// Admissions still inside the window at `now_millis`, counted without pruning.
    pub fn peek_used(&self, now_millis: u64) -> usize {
        self.admissions.iter().filter(|&&ts| !self.is_expired(ts, now_millis)).count()
    }

    /// Time until reset as seen by a non-mutating observer: ignores already-expired entries.
    pub fn peek_time_until_reset(&self, now_millis: u64) -> Duration {
        self.admissions
            .iter()
            .find(|&&ts| !self.is_expired(ts, now_millis))
            .map(|&oldest| {
                let reset_at = oldest.saturating_add(self.window_millis());
                Duration::from_millis(reset_at.saturating_sub(now_millis))
            })
            .unwrap_or(Duration::ZERO)
    }

    /// Number of retained timestamps (expired ones included until the next prune).
    pub fn retained(&self) -> usize {
        self.admissions.len()
    }

    fn prune(&mut self, now_millis: u64) {
        while let Some(&front) = self.admissions.front() {
            if self.is_expired(front, now_millis) {
                self.admissions.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_expired(&self, ts: u64, now_millis: u64) -> bool {
        now_millis.saturating_sub(ts) >= self.window_millis()
    }

    fn window_millis(&self) -> u64 {
        u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX)
    }
}
