//! Retry with halved exponential backoff.
//!
//! Each attempt first waits out the category's current backoff window, then runs the operation.
//! Rate-limit denials and non-retryable failures propagate at once. A transient failure is
//! recorded on the controller and followed by a sleep of half of `exponential_backoff(attempt +
//! 1)` before the next attempt.
//!
//! ```rust
//! use skyguard::{AdmissionController, CategoryRegistry, InstantSleeper, RetryPolicy, ToolError};
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::sync::Arc;
//!
//! # tokio_test_block_on(async {
//! let controller = Arc::new(
//!     AdmissionController::new(CategoryRegistry::default()).with_sleeper(InstantSleeper),
//! );
//! let policy = RetryPolicy::new(controller, "general", 3);
//! let calls = AtomicU32::new(0);
//! let result = policy
//!     .execute(|| async {
//!         if calls.fetch_add(1, Ordering::SeqCst) < 2 {
//!             Err(ToolError::operation("connection reset"))
//!         } else {
//!             Ok("done")
//!         }
//!     })
//!     .await;
//! assert_eq!(result, Ok("done"));
//! assert_eq!(calls.load(Ordering::SeqCst), 3);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(f)
//! # }
//! ```

use crate::error::ToolError;
use crate::rate_limit::AdmissionController;
use crate::telemetry::{GuardEvent, Telemetry};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;
use tracing::{debug, warn};

/// Retry engine bound to one category.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    category: String,
    controller: Arc<AdmissionController>,
    telemetry: Telemetry,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// `max_retries` extra attempts after the first, so at most `max_retries + 1` calls.
    pub fn new(controller: Arc<AdmissionController>, category: impl Into<String>, max_retries: u32) -> Self {
        Self { max_retries, category: category.into(), controller, telemetry: Telemetry::null() }
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Run `operation` until it succeeds, fails terminally, or attempts run out.
    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<T, ToolError>
    where
        Fut: Future<Output = Result<T, ToolError>>,
        Op: FnMut() -> Fut,
    {
        let mut attempt = 0u32;
        loop {
            self.controller.wait_if_needed(&self.category).await;

            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if let ToolError::RateLimited(denied) = &err {
                debug!(target: "skyguard::retry", category = %self.category, scope = %denied.category, "rate limited; not retrying");
                return Err(err);
            }
            if !err.is_retryable() {
                debug!(target: "skyguard::retry", category = %self.category, error = %err, "non-retryable failure");
                return Err(err);
            }

            self.controller.record_failure(&self.category);
            if attempt >= self.max_retries {
                warn!(
                    target: "skyguard::retry",
                    category = %self.category,
                    attempts = attempt + 1,
                    error = %err,
                    "retries exhausted"
                );
                return Err(err);
            }

            attempt += 1;
            let delay = self.controller.exponential_backoff(&self.category, Some(attempt)) / 2;
            debug!(target: "skyguard::retry", category = %self.category, attempt, delay_ms = delay.as_millis() as u64, "retrying");
            self.telemetry
                .emit(GuardEvent::RetryAttempt { category: self.category.clone(), attempt, delay })
                .await;
            self.controller.sleeper().sleep(delay).await;
        }
    }
}

/// Tower layer applying a [`RetryPolicy`] to every call.
#[derive(Clone, Debug)]
pub struct RetryLayer {
    policy: RetryPolicy,
}

impl RetryLayer {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService { inner, policy: self.policy.clone() }
    }
}

/// Retry service produced by [`RetryLayer`]; requests are cloned per attempt.
#[derive(Clone, Debug)]
pub struct RetryService<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S, Request> Service<Request> for RetryService<S>
where
    Request: Clone + Send + 'static,
    S: Service<Request, Error = ToolError> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = ToolError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let policy = self.policy.clone();
        let inner = self.inner.clone();
        Box::pin(async move { policy.execute(move || inner.clone().oneshot(req.clone())).await })
    }
}
