//! Tool catalog and dispatch.
//!
//! Every tool is a [`GuardedOperation`]: a thin handler mapping JSON arguments onto one
//! [`SocialClient`](crate::client::SocialClient) call, composed with the stages its
//! [`OperationConfig`] names. [`ToolRegistry::call`] runs the operation inside the request
//! queue and always produces a [`ToolResponse`].

pub mod feeds;
pub mod interactions;
pub mod media;
pub mod posts;
pub mod profiles;
pub mod search;
pub mod status;

use crate::auth::{Connector, SessionCache};
use crate::client::{NewPost, Page, RecordRef};
use crate::config::{ConfigError, Settings};
use crate::error::ToolError;
use crate::pipeline::{compose, GuardedOperation, Handler, OperationConfig, Runtime};
use crate::queue::RequestQueue;
use crate::rate_limit::AdmissionController;
use crate::response::ToolResponse;
use crate::telemetry::GuardEvent;
use crate::validation::{InputValidator, MAX_POST_LENGTH};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Page size used when a list tool is called without `limit`.
pub const DEFAULT_LIMIT: u32 = 50;

/// Name → guarded operation, plus the runtime they were composed against.
#[derive(Debug)]
pub struct ToolRegistry {
    runtime: Runtime,
    tools: BTreeMap<String, GuardedOperation>,
}

impl ToolRegistry {
    /// An empty catalog.
    pub fn new(runtime: Runtime) -> Self {
        Self { runtime, tools: BTreeMap::new() }
    }

    /// The full Bluesky catalog.
    pub fn with_default_tools(runtime: Runtime) -> Self {
        let mut registry = Self::new(runtime);
        status::register(&mut registry);
        posts::register(&mut registry);
        interactions::register(&mut registry);
        profiles::register(&mut registry);
        feeds::register(&mut registry);
        search::register(&mut registry);
        media::register(&mut registry);
        registry
    }

    /// Build the runtime from settings and register the full catalog.
    pub fn from_settings<C>(settings: &Settings, connector: C) -> Result<Self, ConfigError>
    where
        C: Connector + 'static,
    {
        let controller = AdmissionController::new(settings.rate_limits.registry()?);
        let validator = InputValidator { max_post_length: MAX_POST_LENGTH, max_file_size: settings.media.max_image_size };
        let runtime = Runtime::new(Arc::new(controller))
            .with_queue(RequestQueue::new(settings.max_concurrent))
            .with_auth(SessionCache::new(settings.credentials(), connector))
            .with_validator(validator)
            .with_media(settings.media.processor());
        Ok(Self::with_default_tools(runtime))
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Compose and add a tool. A tool with the same name is replaced.
    pub fn register(&mut self, config: OperationConfig, handler: Handler) {
        let name = config.operation_name().to_string();
        let operation = compose(config, &self.runtime, handler);
        self.tools.insert(name, operation);
    }

    pub fn get(&self, name: &str) -> Option<&GuardedOperation> {
        self.tools.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run `name` with `args` (a JSON object; `null` counts as no arguments) inside the queue.
    pub async fn call(&self, name: &str, args: Value) -> ToolResponse {
        let Some(operation) = self.tools.get(name) else {
            return ToolResponse::failure(name, &ToolError::Permanent(format!("unknown tool '{name}'")));
        };
        let args = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let err = ToolError::validation("arguments", format!("expected an object, got {other}"));
                return ToolResponse::failure(name, &err);
            }
        };

        let queue = &self.runtime.queue;
        let _permit = match queue.acquire().await {
            Ok(permit) => permit,
            Err(err) => return ToolResponse::failure(name, &ToolError::operation(err.to_string())),
        };
        let status = queue.status();
        debug!(target: "skyguard::pipeline", tool = name, active = status.active, "queue slot acquired");
        self.runtime
            .telemetry
            .emit(GuardEvent::QueueAcquired { active: status.active, max_concurrent: status.max_concurrent })
            .await;

        operation.call(args).await
    }
}

/// Typed access to a call's JSON arguments.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a>(pub &'a Map<String, Value>);

impl<'a> Args<'a> {
    fn present(&self, name: &str) -> Option<&'a Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    pub fn str(&self, name: &str) -> Result<String, ToolError> {
        self.opt_str(name)?.ok_or_else(|| missing(name))
    }

    /// Empty strings count as absent.
    pub fn opt_str(&self, name: &str) -> Result<Option<String>, ToolError> {
        match self.present(name) {
            None => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(ToolError::validation(name, "expected a string")),
        }
    }

    pub fn opt_u32(&self, name: &str) -> Result<Option<u32>, ToolError> {
        match self.present(name) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| ToolError::validation(name, "expected a non-negative integer")),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ToolError::validation(name, "expected a non-negative integer")),
            Some(_) => Err(ToolError::validation(name, "expected a non-negative integer")),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool, ToolError> {
        match self.present(name) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(ToolError::validation(name, "expected a boolean")),
        }
    }

    pub fn str_list(&self, name: &str) -> Result<Vec<String>, ToolError> {
        match self.present(name) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(ToolError::validation(name, "expected a list of strings")),
                })
                .collect(),
            Some(_) => Err(ToolError::validation(name, "expected a list of strings")),
        }
    }

    pub fn json(&self, name: &str) -> Option<Value> {
        self.present(name).cloned()
    }

    /// `cursor` plus `limit` (already clamped by the `limit` rule), defaulting to [`DEFAULT_LIMIT`].
    pub fn page(&self) -> Result<Page, ToolError> {
        self.page_or(DEFAULT_LIMIT)
    }

    pub fn page_or(&self, default_limit: u32) -> Result<Page, ToolError> {
        Ok(Page { cursor: self.opt_str("cursor")?, limit: Some(self.opt_u32("limit")?.unwrap_or(default_limit)) })
    }

    /// The post fields shared by `send_post` and the media tools.
    pub fn new_post(&self) -> Result<NewPost, ToolError> {
        Ok(NewPost {
            text: self.str("text")?,
            author: self.opt_str("profile_identify")?,
            reply_to: self.json("reply_to"),
            embed: self.json("embed"),
            langs: self.str_list("langs")?,
            facets: self.json("facets"),
        })
    }
}

fn missing(name: &str) -> ToolError {
    ToolError::Validation { param: name.to_string(), detail: format!("Missing required parameter '{name}'") }
}

/// `{message, <prefix>_uri, <prefix>_cid}` for a created record.
pub(crate) fn created(message: &str, prefix: &str, record: RecordRef) -> Value {
    let mut body = Map::new();
    body.insert("status".to_string(), Value::from("success"));
    body.insert("message".to_string(), Value::from(message));
    body.insert(format!("{prefix}_uri"), Value::from(record.uri));
    body.insert(format!("{prefix}_cid"), Value::from(record.cid));
    Value::Object(body)
}

/// Boolean client results: `false` means the server did not apply the change.
pub(crate) fn confirmed(done: bool, message: &str) -> Result<Value, ToolError> {
    if done {
        Ok(json!({ "status": "success", "message": message }))
    } else {
        Err(ToolError::Permanent("the server did not confirm the change".to_string()))
    }
}
