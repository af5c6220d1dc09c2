#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # skyguard
//!
//! Guarded tool calls for a Bluesky MCP server: per-category sliding-window rate limits under a
//! global ceiling, failure-driven exponential backoff, retry of transient failures, and a
//! bounded concurrency queue, composed around each tool as an ordered stack of tower layers.
//!
//! ## Pieces
//!
//! - [`AdmissionController`]: category windows, the global window, failure tracking, backoff.
//! - [`RetryPolicy`]: retries transient failures with halved exponential backoff.
//! - [`RequestQueue`]: caps simultaneous in-flight calls.
//! - [`pipeline::compose`]: error boundary → auth → validation → admission → retry → usage.
//! - [`ToolRegistry`]: the Bluesky tool catalog behind the queue.
//!
//! ## Quick start
//!
//! ```rust
//! use skyguard::pipeline::{compose, handler, OperationConfig, Runtime, ToolRequest};
//! use skyguard::{AdmissionController, CategoryRegistry, ToolError};
//! use serde_json::{json, Map, Value};
//! use std::sync::Arc;
//!
//! # tokio_test_block_on(async {
//! let runtime = Runtime::new(Arc::new(AdmissionController::new(CategoryRegistry::default())));
//! let echo = compose(
//!     OperationConfig::new("echo").requires_auth(false),
//!     &runtime,
//!     handler(|req: ToolRequest| async move { Ok::<Value, ToolError>(Value::Object(req.args)) }),
//! );
//!
//! let response = echo.call(Map::new()).await;
//! assert_eq!(response.to_json(), json!({"status": "success"}));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(f)
//! # }
//! ```

pub mod auth;
pub mod backoff;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod media;
pub mod pipeline;
pub mod prelude;
pub mod queue;
pub mod rate_limit;
pub mod response;
pub mod retry;
pub mod sleeper;
pub mod telemetry;
pub mod tools;
pub mod validation;

// Re-exports
pub use auth::{AuthProvider, Connector, Credentials, SessionCache, StaticSession};
pub use backoff::Backoff;
pub use client::{ClientError, RecordRef, SocialClient};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ConfigError, Settings};
pub use error::{ErrorKind, ToolError};
pub use pipeline::{GuardedOperation, OperationConfig, Runtime};
pub use queue::{QueueStatus, RequestQueue};
pub use rate_limit::{AdmissionController, CategoryRegistry, Decision, LimitSpec, RateLimitExceeded};
pub use response::ToolResponse;
pub use retry::{RetryLayer, RetryPolicy};
pub use sleeper::{ClockSleeper, InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use tools::ToolRegistry;
pub use validation::{InputValidator, Rule};
