//! Admission control: category + global windows, failure tracking, and backoff waits.
//!
//! Invariants:
//! - A call is admitted only if both the global window and its category window allow it; the
//!   global window is checked first and is reported as `"global"` when it denies.
//! - [`AdmissionController::try_admit`] holds the global lock, then the category lock, while it
//!   checks and records, so concurrent callers can never overshoot a capacity. Locks are always
//!   taken in that order and never held across an `.await`.
//! - [`AdmissionController::status`] observes without pruning (see DESIGN.md); only `check` and
//!   `try_admit` mutate windows as a side effect of the query.

use super::failures::{FailureState, FailureTracker};
use super::registry::{CategoryRegistry, GLOBAL};
use super::{Decision, RateLimitExceeded};
use crate::backoff::Backoff;
use crate::clock::{Clock, MonotonicClock};
use crate::sleeper::{Sleeper, TokioSleeper};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Snapshot of one window as reported by [`AdmissionController::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimitStatus {
    pub allowed: u32,
    pub used: usize,
    pub remaining: u32,
    /// Seconds until the oldest admission leaves the window.
    pub reset_in: f64,
    /// Consecutive failures; absent for the global window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures: Option<u32>,
}

/// Where a category sits in its backoff cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffState {
    /// No failures since the last success.
    Cool,
    /// Failures recorded and the backoff delay has not elapsed yet.
    BackingOff { remaining: Duration },
    /// Failures recorded but the backoff delay has elapsed.
    Ready,
}

/// The rate limiter proper.
#[derive(Debug)]
pub struct AdmissionController {
    registry: CategoryRegistry,
    failures: FailureTracker,
    backoff: Backoff,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl AdmissionController {
    /// Controller over `registry` using real time and the default backoff.
    pub fn new(registry: CategoryRegistry) -> Self {
        Self {
            registry,
            failures: FailureTracker::new(),
            backoff: Backoff::default(),
            clock: Arc::new(MonotonicClock::default()),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    /// Sleeper shared with the retry engine so all waits use the same time source.
    pub fn sleeper(&self) -> Arc<dyn Sleeper> {
        self.sleeper.clone()
    }

    /// Ask whether one more call in `category` may proceed right now. Records nothing.
    pub fn check(&self, category: &str) -> Decision {
        self.decide(category, false)
    }

    /// Check and take a slot in one step: on `Allowed` the call is already counted on both
    /// the global and the category window. The slot is never refunded.
    pub fn try_admit(&self, category: &str) -> Decision {
        self.decide(category, true)
    }

    fn decide(&self, category: &str, take: bool) -> Decision {
        let now = self.clock.now_millis();

        let mut global = CategoryRegistry::lock(self.registry.global());
        if !global.is_allowed(now) {
            let wait = global.time_until_reset(now);
            debug!(target: "skyguard::rate_limit", category = GLOBAL, wait_ms = wait.as_millis() as u64, "global limit denied");
            return Decision::Denied { scope: GLOBAL.to_string(), wait };
        }

        let (_, limit) = self.registry.resolve(category);
        let mut limit = CategoryRegistry::lock(limit);
        if !limit.is_allowed(now) {
            let wait = limit.time_until_reset(now);
            debug!(target: "skyguard::rate_limit", category, wait_ms = wait.as_millis() as u64, "category limit denied");
            return Decision::Denied { scope: category.to_string(), wait };
        }

        let used = u32::try_from(limit.retained()).unwrap_or(u32::MAX);
        let remaining = limit.capacity().saturating_sub(used);
        if take {
            global.record(now);
            limit.record(now);
        }
        Decision::Allowed { remaining }
    }

    /// [`check`](Self::check) as a `Result`, for `?`-style callers.
    pub fn check_limit(&self, category: &str) -> Result<(), RateLimitExceeded> {
        match self.check(category) {
            Decision::Allowed { .. } => Ok(()),
            Decision::Denied { scope, wait } => Err(RateLimitExceeded::new(scope, wait)),
        }
    }

    /// Record a successful call on the global and category windows and clear failures.
    pub fn record_request(&self, category: &str) {
        let now = self.clock.now_millis();
        CategoryRegistry::lock(self.registry.global()).record(now);
        let (_, limit) = self.registry.resolve(category);
        CategoryRegistry::lock(limit).record(now);
        self.failures.record_success(category);
    }

    /// Clear the category's failures after a call admitted by [`try_admit`](Self::try_admit)
    /// succeeds.
    pub fn record_success(&self, category: &str) {
        self.failures.record_success(category);
    }

    /// Record a failed call for backoff purposes.
    pub fn record_failure(&self, category: &str) {
        let count = self.failures.record_failure(category, self.clock.now_millis());
        if count > 1 {
            warn!(target: "skyguard::rate_limit", category, failures = count, "consecutive failures");
        } else {
            debug!(target: "skyguard::rate_limit", category, failures = count, "failure recorded");
        }
    }

    pub fn failure_count(&self, category: &str) -> u32 {
        self.failures.count(category)
    }

    pub fn failure_state(&self, category: &str) -> FailureState {
        self.failures.state(category)
    }

    /// Backoff delay for `attempt`, or for the category's current failure count when `None`.
    pub fn exponential_backoff(&self, category: &str, attempt: Option<u32>) -> Duration {
        let attempt = attempt.unwrap_or_else(|| self.failures.count(category));
        self.backoff.delay(attempt)
    }

    /// Current position in the cool / backing-off / ready cycle.
    pub fn backoff_state(&self, category: &str) -> BackoffState {
        let state = self.failures.state(category);
        if state.count == 0 {
            return BackoffState::Cool;
        }
        let required = self.backoff.delay(state.count);
        let elapsed = Duration::from_millis(
            self.clock.now_millis().saturating_sub(state.last_failure_millis.unwrap_or(0)),
        );
        if elapsed < required {
            BackoffState::BackingOff { remaining: required - elapsed }
        } else {
            BackoffState::Ready
        }
    }

    /// Suspend the caller until the category's backoff window has elapsed. No-op when cool.
    ///
    /// A single bounded sleep; no lock is held while sleeping.
    pub async fn wait_if_needed(&self, category: &str) {
        if let BackoffState::BackingOff { remaining } = self.backoff_state(category) {
            debug!(target: "skyguard::rate_limit", category, wait_ms = remaining.as_millis() as u64, "backing off");
            self.sleeper.sleep(remaining).await;
        }
    }

    /// Per-category and global snapshot keyed by name (`"global"` included).
    pub fn status(&self) -> BTreeMap<String, LimitStatus> {
        let now = self.clock.now_millis();
        let mut status: BTreeMap<String, LimitStatus> = self
            .registry
            .categories()
            .map(|name| {
                let (_, limit) = self.registry.resolve(name);
                let snapshot = snapshot(&CategoryRegistry::lock(limit), now, Some(self.failures.count(name)));
                (name.to_string(), snapshot)
            })
            .collect();
        status.insert(GLOBAL.to_string(), snapshot(&CategoryRegistry::lock(self.registry.global()), now, None));
        status
    }
}

fn snapshot(limit: &super::window::SlidingWindowLimit, now: u64, failures: Option<u32>) -> LimitStatus {
    let used = limit.peek_used(now);
    LimitStatus {
        allowed: limit.capacity(),
        used,
        remaining: limit.capacity().saturating_sub(u32::try_from(used).unwrap_or(u32::MAX)),
        reset_in: limit.peek_time_until_reset(now).as_secs_f64(),
        failures,
    }
}
