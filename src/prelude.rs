//! Convenient re-exports for common skyguard types.
pub use crate::{
    auth::{AuthProvider, Connector, Credentials, SessionCache},
    backoff::Backoff,
    client::{ClientError, NewPost, Page, RecordRef, SocialClient},
    config::Settings,
    error::{ErrorKind, ToolError},
    pipeline::{compose, handler, Guard, GuardedOperation, OperationConfig, Runtime, ToolRequest},
    queue::RequestQueue,
    rate_limit::{AdmissionController, AdmissionLayer, CategoryRegistry, LimitSpec, RateLimitExceeded},
    response::ToolResponse,
    retry::{RetryLayer, RetryPolicy},
    telemetry::{GuardEvent, MemorySink, Telemetry},
    tools::ToolRegistry,
    validation::Rule,
};
