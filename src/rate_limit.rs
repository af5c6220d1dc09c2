//! Category-based rate limiting.
//!
//! - [`SlidingWindowLimit`]: one trailing-window counter.
//! - [`CategoryRegistry`]: fixed category → window mapping plus the global ceiling.
//! - [`FailureTracker`]: consecutive failures per category.
//! - [`AdmissionController`]: combines the three and computes backoff.
//! - [`AdmissionLayer`]: tower middleware placing the controller in front of a service.
//!
//! Controllers are ordinary values: construct one per test or per server. [`global`] keeps a
//! lazily built process-wide instance with the default limits for callers that want one.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

pub mod controller;
pub mod failures;
pub mod middleware;
pub mod registry;
pub mod window;

pub use controller::{AdmissionController, BackoffState, LimitStatus};
pub use failures::{FailureState, FailureTracker};
pub use middleware::{AdmissionLayer, AdmissionService, FailureAccounting};
pub use registry::{CategoryRegistry, LimitSpec, RegistryBuilder, RegistryError};
pub use window::SlidingWindowLimit;

/// The result of an admission check.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The call may proceed.
    Allowed {
        /// Slots left in the category window before this call is recorded.
        remaining: u32,
    },
    /// The call is denied.
    Denied {
        /// `"global"` or the category whose window is full.
        scope: String,
        /// How long until a slot frees up.
        wait: Duration,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Admission denied by a category or the global window.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded for {category}. Retry after {:.1} seconds", .retry_after.as_secs_f64())]
pub struct RateLimitExceeded {
    /// `"global"` or the specific category name.
    pub category: String,
    pub retry_after: Duration,
}

impl RateLimitExceeded {
    pub fn new(category: impl Into<String>, retry_after: Duration) -> Self {
        Self { category: category.into(), retry_after }
    }

    /// `retry_after` as fractional seconds, the unit callers see.
    pub fn retry_after_secs(&self) -> f64 {
        self.retry_after.as_secs_f64()
    }
}

static GLOBAL_CONTROLLER: OnceLock<Arc<AdmissionController>> = OnceLock::new();

/// Process-wide controller with the default registry, built on first use.
pub fn global() -> Arc<AdmissionController> {
    GLOBAL_CONTROLLER
        .get_or_init(|| Arc::new(AdmissionController::new(CategoryRegistry::default())))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category_and_wait() {
        let err = RateLimitExceeded::new("posts", Duration::from_millis(59_750));
        assert_eq!(err.to_string(), "rate limit exceeded for posts. Retry after 59.8 seconds");
        assert!((err.retry_after_secs() - 59.75).abs() < 1e-9);
    }

    #[test]
    fn global_accessor_returns_same_instance() {
        let a = global();
        let b = global();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.registry().is_known(registry::POSTS));
    }
}
