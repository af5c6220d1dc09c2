//! Guarded operations.
//!
//! [`compose`] wraps a [`Handler`] in a fixed stack of tower layers, outermost first:
//!
//! 1. [`Guard::ErrorBoundary`]: every outcome becomes a [`ToolResponse`].
//! 2. [`Guard::Authenticate`]: resolves the session and puts it in the request.
//! 3. [`Guard::Validate`]: applies the configured [`Rule`]s and writes normalised values back.
//! 4. [`Guard::Admit`]: [`AdmissionLayer`] for the operation's category.
//! 5. [`Guard::Retry`]: [`RetryLayer`], only when `max_retries > 0`.
//! 6. [`Guard::Usage`]: times the call and emits [`GuardEvent::Completed`].
//!
//! Authentication runs before validation so an unauthenticated caller never sees validation
//! errors, and validation runs before admission so malformed calls cost no rate-limit slot.

use crate::auth::{AuthProvider, AUTH_UNAVAILABLE};
use crate::client::SocialClient;
use crate::error::ToolError;
use crate::media::MediaProcessor;
use crate::queue::RequestQueue;
use crate::rate_limit::registry::GENERAL;
use crate::rate_limit::{AdmissionController, AdmissionLayer, FailureAccounting};
use crate::response::ToolResponse;
use crate::retry::{RetryLayer, RetryPolicy};
use crate::telemetry::{GuardEvent, Outcome, Telemetry};
use crate::validation::{InputValidator, Rule};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Instant;
use tower::util::BoxCloneService;
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;
use tracing::{debug, warn};

/// Arguments of one call plus the session resolved by the authentication stage.
#[derive(Clone, Default)]
pub struct ToolRequest {
    pub args: Map<String, Value>,
    client: Option<Arc<dyn SocialClient>>,
}

impl ToolRequest {
    pub fn new(args: Map<String, Value>) -> Self {
        Self { args, client: None }
    }

    pub fn with_client(mut self, client: Arc<dyn SocialClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// The authenticated session. Fails for operations composed without an auth stage.
    pub fn client(&self) -> Result<Arc<dyn SocialClient>, ToolError> {
        self.client
            .clone()
            .ok_or_else(|| ToolError::Authentication(AUTH_UNAVAILABLE.to_string()))
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }
}

impl fmt::Debug for ToolRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRequest")
            .field("args", &self.args)
            .field("authenticated", &self.client.is_some())
            .finish()
    }
}

/// The raw operation at the centre of the stack.
pub type Handler = Arc<dyn Fn(ToolRequest) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync>;

pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(ToolRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

/// Type-erased service between stages.
pub type ToolService = BoxCloneService<ToolRequest, Value, ToolError>;

/// Immutable per-operation configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationConfig {
    operation_name: String,
    category: String,
    requires_auth: bool,
    validators: BTreeMap<String, Rule>,
    max_retries: u32,
    log_category: Option<String>,
}

impl OperationConfig {
    /// Category `general`, authentication required, no validators, no retries.
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            category: GENERAL.to_string(),
            requires_auth: true,
            validators: BTreeMap::new(),
            max_retries: 0,
            log_category: None,
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn requires_auth(mut self, requires_auth: bool) -> Self {
        self.requires_auth = requires_auth;
        self
    }

    pub fn validate(mut self, param: impl Into<String>, rule: Rule) -> Self {
        self.validators.insert(param.into(), rule);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn log_category(mut self, log_category: impl Into<String>) -> Self {
        self.log_category = Some(log_category.into());
        self
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    pub fn rate_category(&self) -> &str {
        &self.category
    }

    pub fn auth_required(&self) -> bool {
        self.requires_auth
    }

    pub fn validators(&self) -> &BTreeMap<String, Rule> {
        &self.validators
    }

    pub fn retries(&self) -> u32 {
        self.max_retries
    }

    /// Label used for usage events; the operation name unless set.
    pub fn usage_label(&self) -> &str {
        self.log_category.as_deref().unwrap_or(&self.operation_name)
    }

    /// Stages this configuration produces, outermost first.
    pub fn guards(&self) -> Vec<Guard> {
        let mut guards = vec![Guard::ErrorBoundary];
        if self.requires_auth {
            guards.push(Guard::Authenticate);
        }
        if !self.validators.is_empty() {
            guards.push(Guard::Validate);
        }
        guards.push(Guard::Admit);
        if self.max_retries > 0 {
            guards.push(Guard::Retry);
        }
        guards.push(Guard::Usage);
        guards
    }
}

/// One stage of a guarded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    ErrorBoundary,
    Authenticate,
    Validate,
    Admit,
    Retry,
    Usage,
}

/// Shared components every guarded operation is composed against.
#[derive(Clone)]
pub struct Runtime {
    pub controller: Arc<AdmissionController>,
    pub queue: RequestQueue,
    pub auth: Option<Arc<dyn AuthProvider>>,
    pub telemetry: Telemetry,
    pub validator: Arc<InputValidator>,
    pub media: MediaProcessor,
}

impl Runtime {
    pub fn new(controller: Arc<AdmissionController>) -> Self {
        Self {
            controller,
            queue: RequestQueue::default(),
            auth: None,
            telemetry: Telemetry::null(),
            validator: Arc::new(InputValidator::default()),
            media: MediaProcessor::default(),
        }
    }

    pub fn with_queue(mut self, queue: RequestQueue) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_auth<P>(mut self, provider: P) -> Self
    where
        P: AuthProvider + 'static,
    {
        self.auth = Some(Arc::new(provider));
        self
    }

    pub fn with_shared_auth(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(provider);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_validator(mut self, validator: InputValidator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn with_media(mut self, media: MediaProcessor) -> Self {
        self.media = media;
        self
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("controller", &self.controller)
            .field("queue", &self.queue)
            .field("auth", &self.auth.is_some())
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}

/// Wrap `handler` in the stages `config` calls for.
pub fn compose(config: OperationConfig, runtime: &Runtime, handler: Handler) -> GuardedOperation {
    let stages = config.guards();
    let mut service: ToolService = BoxCloneService::new(tower::service_fn(move |req: ToolRequest| handler(req)));

    for guard in stages.iter().rev() {
        service = match guard {
            Guard::Usage => BoxCloneService::new(
                UsageLayer::new(config.operation_name(), config.usage_label(), runtime.telemetry.clone())
                    .layer(service),
            ),
            Guard::Retry => {
                let policy = RetryPolicy::new(runtime.controller.clone(), config.rate_category(), config.retries())
                    .with_telemetry(runtime.telemetry.clone());
                BoxCloneService::new(RetryLayer::new(policy).layer(service))
            }
            Guard::Admit => {
                let accounting = if stages.contains(&Guard::Retry) {
                    FailureAccounting::DelegatedToRetry
                } else {
                    FailureAccounting::RecordAll
                };
                BoxCloneService::new(
                    AdmissionLayer::new(runtime.controller.clone(), config.rate_category())
                        .with_accounting(accounting)
                        .with_telemetry(runtime.telemetry.clone())
                        .layer(service),
                )
            }
            Guard::Validate => BoxCloneService::new(
                ValidateLayer::new(config.validators().clone(), runtime.validator.clone()).layer(service),
            ),
            Guard::Authenticate => BoxCloneService::new(AuthLayer::new(runtime.auth.clone()).layer(service)),
            Guard::ErrorBoundary => service,
        };
    }

    let boundary = ErrorBoundaryLayer::new(config.operation_name()).layer(service);
    GuardedOperation { config, stages, service: Mutex::new(boundary) }
}

/// A composed operation. Calls never fail; errors come back as [`ToolResponse::Error`].
pub struct GuardedOperation {
    config: OperationConfig,
    stages: Vec<Guard>,
    service: Mutex<ErrorBoundaryService<ToolService>>,
}

impl GuardedOperation {
    pub fn config(&self) -> &OperationConfig {
        &self.config
    }

    pub fn stages(&self) -> &[Guard] {
        &self.stages
    }

    pub async fn call(&self, args: Map<String, Value>) -> ToolResponse {
        self.call_request(ToolRequest::new(args)).await
    }

    pub async fn call_request(&self, req: ToolRequest) -> ToolResponse {
        let service = self.service.lock().unwrap_or_else(PoisonError::into_inner).clone();
        match service.oneshot(req).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }
}

impl fmt::Debug for GuardedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedOperation")
            .field("config", &self.config)
            .field("stages", &self.stages)
            .finish()
    }
}

/// Outermost stage: converts results into [`ToolResponse`]s.
#[derive(Debug, Clone)]
pub struct ErrorBoundaryLayer {
    operation: Arc<str>,
}

impl ErrorBoundaryLayer {
    pub fn new(operation: &str) -> Self {
        Self { operation: Arc::from(operation) }
    }
}

impl<S> Layer<S> for ErrorBoundaryLayer {
    type Service = ErrorBoundaryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ErrorBoundaryService { inner, operation: self.operation.clone() }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorBoundaryService<S> {
    inner: S,
    operation: Arc<str>,
}

impl<S> Service<ToolRequest> for ErrorBoundaryService<S>
where
    S: Service<ToolRequest, Response = Value, Error = ToolError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = ToolResponse;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<ToolResponse, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // inner readiness is driven per call, so a failing inner still produces a response
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ToolRequest) -> Self::Future {
        let inner = self.inner.clone();
        let operation = self.operation.clone();
        Box::pin(async move {
            let result = inner.oneshot(req).await;
            if let Err(err) = &result {
                warn!(
                    target: "skyguard::pipeline",
                    operation = %operation,
                    error_type = %err.kind(),
                    error = %err,
                    "operation failed"
                );
            }
            Ok(ToolResponse::from_result(&operation, result))
        })
    }
}

/// Resolves the session before the inner stages run.
#[derive(Clone)]
pub struct AuthLayer {
    provider: Option<Arc<dyn AuthProvider>>,
}

impl AuthLayer {
    pub fn new(provider: Option<Arc<dyn AuthProvider>>) -> Self {
        Self { provider }
    }
}

impl fmt::Debug for AuthLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthLayer").field("provider", &self.provider.is_some()).finish()
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService { inner, provider: self.provider.clone() }
    }
}

#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    provider: Option<Arc<dyn AuthProvider>>,
}

impl<S> Service<ToolRequest> for AuthService<S>
where
    S: Service<ToolRequest, Error = ToolError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
{
    type Response = S::Response;
    type Error = ToolError;
    type Future = BoxFuture<'static, Result<S::Response, ToolError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ToolRequest) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let provider = self.provider.clone();
        Box::pin(async move {
            let provider = provider.ok_or_else(|| ToolError::Authentication(AUTH_UNAVAILABLE.to_string()))?;
            let client = provider.resolve().await?;
            inner.call(req.with_client(client)).await
        })
    }
}

/// Applies named rules to the arguments they are configured for.
#[derive(Debug, Clone)]
pub struct ValidateLayer {
    rules: Arc<BTreeMap<String, Rule>>,
    validator: Arc<InputValidator>,
}

impl ValidateLayer {
    pub fn new(rules: BTreeMap<String, Rule>, validator: Arc<InputValidator>) -> Self {
        Self { rules: Arc::new(rules), validator }
    }

    /// Check every configured argument present in `args`, replacing it with its normalised form.
    /// Absent and `null` arguments are skipped.
    pub fn apply(&self, args: &mut Map<String, Value>) -> Result<(), ToolError> {
        for (param, rule) in self.rules.iter() {
            let Some(value) = args.get_mut(param) else { continue };
            if value.is_null() {
                continue;
            }
            *value = rule.apply(&self.validator, value).map_err(|e| ToolError::validation(param.as_str(), e))?;
        }
        Ok(())
    }
}

impl<S> Layer<S> for ValidateLayer {
    type Service = ValidateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ValidateService { inner, layer: self.clone() }
    }
}

#[derive(Debug, Clone)]
pub struct ValidateService<S> {
    inner: S,
    layer: ValidateLayer,
}

impl<S> Service<ToolRequest> for ValidateService<S>
where
    S: Service<ToolRequest, Error = ToolError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
{
    type Response = S::Response;
    type Error = ToolError;
    type Future = BoxFuture<'static, Result<S::Response, ToolError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: ToolRequest) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let layer = self.layer.clone();
        Box::pin(async move {
            layer.apply(&mut req.args)?;
            inner.call(req).await
        })
    }
}

/// Innermost stage: labels the call for observability. No effect on the result.
#[derive(Debug, Clone)]
pub struct UsageLayer {
    operation: Arc<str>,
    usage: Arc<str>,
    telemetry: Telemetry,
}

impl UsageLayer {
    pub fn new(operation: &str, usage: &str, telemetry: Telemetry) -> Self {
        Self { operation: Arc::from(operation), usage: Arc::from(usage), telemetry }
    }
}

impl<S> Layer<S> for UsageLayer {
    type Service = UsageService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UsageService { inner, layer: self.clone() }
    }
}

#[derive(Debug, Clone)]
pub struct UsageService<S> {
    inner: S,
    layer: UsageLayer,
}

impl<S, Req> Service<Req> for UsageService<S>
where
    S: Service<Req, Error = ToolError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = ToolError;
    type Future = BoxFuture<'static, Result<S::Response, ToolError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let UsageLayer { operation, usage, telemetry } = self.layer.clone();
        Box::pin(async move {
            let started = Instant::now();
            let result = inner.call(req).await;
            let duration = started.elapsed();
            let outcome = match &result {
                Ok(_) => Outcome::Success,
                Err(err) => Outcome::Failure(err.kind()),
            };
            debug!(
                target: "skyguard::usage",
                operation = %operation,
                usage = %usage,
                outcome = %outcome,
                duration_ms = duration.as_millis() as u64,
                "tool call finished"
            );
            telemetry
                .emit(GuardEvent::Completed {
                    operation: operation.to_string(),
                    usage: usage.to_string(),
                    outcome,
                    duration,
                })
                .await;
            result
        })
    }
}
