use crate::error::ToolError;
use crate::rate_limit::{AdmissionController, Decision, RateLimitExceeded};
use crate::telemetry::{GuardEvent, Telemetry};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Which inner failures the admission stage records on the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureAccounting {
    /// Record every failure.
    #[default]
    RecordAll,
    /// A retry stage sits inside and records transient failures itself; only record the
    /// failures it passes through untouched.
    DelegatedToRetry,
}

impl FailureAccounting {
    fn should_record(self, err: &ToolError) -> bool {
        match self {
            FailureAccounting::RecordAll => true,
            FailureAccounting::DelegatedToRetry => !err.is_retryable(),
        }
    }
}

/// Checks a category against an [`AdmissionController`] before calling the inner service.
///
/// The slot is taken at admission, before the inner service runs, and is kept whatever the
/// outcome. Denials never reach the inner service but still count as failures, so backoff
/// keeps escalating under sustained contention. A success clears the category's failures.
#[derive(Clone, Debug)]
pub struct AdmissionLayer {
    controller: Arc<AdmissionController>,
    category: Arc<str>,
    accounting: FailureAccounting,
    telemetry: Telemetry,
}

impl AdmissionLayer {
    pub fn new(controller: Arc<AdmissionController>, category: impl Into<String>) -> Self {
        Self {
            controller,
            category: Arc::from(category.into()),
            accounting: FailureAccounting::default(),
            telemetry: Telemetry::null(),
        }
    }

    pub fn with_accounting(mut self, accounting: FailureAccounting) -> Self {
        self.accounting = accounting;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService { inner, layer: self.clone() }
    }
}

/// Middleware service produced by [`AdmissionLayer`].
#[derive(Clone, Debug)]
pub struct AdmissionService<S> {
    inner: S,
    layer: AdmissionLayer,
}

impl<S, Req> Service<Req> for AdmissionService<S>
where
    S: Service<Req, Error = ToolError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = ToolError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let AdmissionLayer { controller, category, accounting, telemetry } = self.layer.clone();

        Box::pin(async move {
            match controller.try_admit(&category) {
                Decision::Denied { scope, wait } => {
                    controller.record_failure(&category);
                    telemetry
                        .emit(GuardEvent::Denied { category: scope.clone(), retry_after: wait })
                        .await;
                    return Err(RateLimitExceeded::new(scope, wait).into());
                }
                Decision::Allowed { remaining } => {
                    telemetry
                        .emit(GuardEvent::Admitted { category: category.to_string(), remaining })
                        .await;
                }
            }

            let result = inner.call(req).await;
            match &result {
                Ok(_) => controller.record_success(&category),
                Err(err) if accounting.should_record(err) => controller.record_failure(&category),
                Err(_) => {}
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rate_limit::{CategoryRegistry, LimitSpec};
    use crate::telemetry::MemorySink;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    fn controller(clock: &ManualClock) -> Arc<AdmissionController> {
        let registry = CategoryRegistry::builder()
            .category("general", LimitSpec::per_minute(10))
            .category("posts", LimitSpec::per_minute(1))
            .build()
            .unwrap();
        Arc::new(AdmissionController::new(registry).with_clock(clock.clone()))
    }

    #[tokio::test]
    async fn denial_skips_inner_and_records_failure() {
        let clock = ManualClock::new();
        let ctl = controller(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let svc = tower::service_fn(move |_: ()| {
            seen.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ToolError>("sent") }
        });
        let svc = AdmissionLayer::new(ctl.clone(), "posts").layer(svc);

        assert_eq!(svc.clone().oneshot(()).await.unwrap(), "sent");
        clock.advance(Duration::from_secs(5));
        let err = svc.oneshot(()).await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(55)));
        assert_eq!(ctl.failure_count("posts"), 1);
    }

    #[tokio::test]
    async fn success_records_admission_and_clears_failures() {
        let clock = ManualClock::new();
        let ctl = controller(&clock);
        ctl.record_failure("general");
        let svc = AdmissionLayer::new(ctl.clone(), "general")
            .layer(tower::service_fn(|_: ()| async { Ok::<_, ToolError>(()) }));
        svc.oneshot(()).await.unwrap();
        assert_eq!(ctl.failure_count("general"), 0);
        assert_eq!(ctl.status()["general"].used, 1);
    }

    #[tokio::test]
    async fn failed_call_keeps_its_slot() {
        let clock = ManualClock::new();
        let ctl = controller(&clock);
        let svc = AdmissionLayer::new(ctl.clone(), "posts")
            .layer(tower::service_fn(|_: ()| async { Err::<(), _>(ToolError::operation("reset")) }));
        svc.clone().oneshot(()).await.unwrap_err();
        let err = svc.oneshot(()).await.unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));
        assert_eq!(ctl.status()["posts"].used, 1);
    }

    #[tokio::test]
    async fn concurrent_callers_cannot_overshoot_capacity() {
        let clock = ManualClock::new();
        let registry = CategoryRegistry::builder()
            .category("general", LimitSpec::per_minute(10))
            .category("posts", LimitSpec::per_minute(2))
            .build()
            .unwrap();
        let ctl = Arc::new(AdmissionController::new(registry).with_clock(clock));
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let svc = AdmissionLayer::new(ctl.clone(), "posts").layer(tower::service_fn(move |_: ()| {
            seen.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, ToolError>(())
            }
        }));

        let results = futures::future::join_all((0..5).map(|_| svc.clone().oneshot(()))).await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(ctl.status()["posts"].used, 2);
    }

    #[tokio::test]
    async fn delegated_accounting_skips_retryable_failures() {
        let clock = ManualClock::new();
        let ctl = controller(&clock);
        let transient = tower::service_fn(|_: ()| async { Err::<(), _>(ToolError::operation("reset")) });
        let permanent = tower::service_fn(|_: ()| async { Err::<(), _>(ToolError::Permanent("gone".into())) });

        let layer = AdmissionLayer::new(ctl.clone(), "general").with_accounting(FailureAccounting::DelegatedToRetry);
        layer.layer(transient).oneshot(()).await.unwrap_err();
        assert_eq!(ctl.failure_count("general"), 0);
        layer.layer(permanent).oneshot(()).await.unwrap_err();
        assert_eq!(ctl.failure_count("general"), 1);
    }

    #[tokio::test]
    async fn emits_admitted_and_denied() {
        let clock = ManualClock::new();
        let ctl = controller(&clock);
        let sink = MemorySink::new();
        let svc = AdmissionLayer::new(ctl, "posts")
            .with_telemetry(Telemetry::new(sink.clone()))
            .layer(tower::service_fn(|_: ()| async { Ok::<_, ToolError>(()) }));
        svc.clone().oneshot(()).await.unwrap();
        svc.oneshot(()).await.unwrap_err();
        assert_eq!(
            sink.events(),
            vec![
                GuardEvent::Admitted { category: "posts".into(), remaining: 1 },
                GuardEvent::Denied { category: "posts".into(), retry_after: Duration::from_secs(60) },
            ]
        );
    }
}
