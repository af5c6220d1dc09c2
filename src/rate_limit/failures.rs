//! Consecutive-failure bookkeeping that drives exponential backoff.
//!
//! Failures are keyed by the category string the caller used, not the resolved window, so an
//! unknown category backs off independently of `general`.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Failure state for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureState {
    /// Consecutive failures since the last recorded success.
    pub count: u32,
    /// Clock reading (millis) of the most recent failure.
    pub last_failure_millis: Option<u64>,
}

/// Per-category consecutive failure counters.
#[derive(Debug, Default)]
pub struct FailureTracker {
    entries: Mutex<HashMap<String, FailureState>>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more failure at `now_millis`; returns the new count.
    pub fn record_failure(&self, category: &str, now_millis: u64) -> u32 {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let state = entries.entry(category.to_string()).or_default();
        state.count = state.count.saturating_add(1);
        state.last_failure_millis = Some(now_millis);
        state.count
    }

    /// Reset the count to zero. The last failure timestamp is kept for diagnostics.
    pub fn record_success(&self, category: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = entries.get_mut(category) {
            state.count = 0;
        }
    }

    pub fn count(&self, category: &str) -> u32 {
        self.state(category).count
    }

    pub fn state(&self, category: &str) -> FailureState {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(category).copied().unwrap_or_default()
    }
}
