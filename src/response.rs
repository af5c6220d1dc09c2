//! Structured results returned to the agent.
//!
//! Success: the operation's JSON object with `status: "success"` added when absent; any other
//! JSON value is wrapped as `{status, message, result}`.
//! Failure: `{status: "error", message, error_type}` plus `retry_after` (seconds) for rate limits.

use crate::error::{ErrorKind, ToolError};
use serde::Serialize;
use serde_json::{json, Value};

/// Body of a failed call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
    pub error_type: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<f64>,
}

/// Outcome of a tool call; always well formed.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResponse {
    Success(Value),
    Error(ErrorBody),
}

impl ToolResponse {
    /// Annotate an operation's output with the success marker.
    pub fn success(operation: &str, output: Value) -> Self {
        match output {
            Value::Object(mut map) => {
                map.entry("status").or_insert_with(|| Value::from("success"));
                ToolResponse::Success(Value::Object(map))
            }
            other => ToolResponse::Success(json!({
                "status": "success",
                "message": format!("Successfully completed {}", display_name(operation)),
                "result": other,
            })),
        }
    }

    /// Convert a failure into an error body with the `Failed to {operation}: {detail}` message.
    pub fn failure(operation: &str, err: &ToolError) -> Self {
        ToolResponse::Error(ErrorBody {
            status: "error",
            message: format!("Failed to {}: {}", display_name(operation), err),
            error_type: err.kind(),
            retry_after: err.retry_after().map(|d| d.as_secs_f64()),
        })
    }

    pub fn from_result(operation: &str, result: Result<Value, ToolError>) -> Self {
        match result {
            Ok(output) => Self::success(operation, output),
            Err(err) => Self::failure(operation, &err),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResponse::Success(_))
    }

    pub fn error_type(&self) -> Option<ErrorKind> {
        match self {
            ToolResponse::Success(_) => None,
            ToolResponse::Error(body) => Some(body.error_type),
        }
    }

    pub fn retry_after(&self) -> Option<f64> {
        match self {
            ToolResponse::Success(_) => None,
            ToolResponse::Error(body) => body.retry_after,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ToolResponse::Success(value) => value.clone(),
            ToolResponse::Error(body) => serde_json::to_value(body).unwrap_or_else(|_| {
                json!({"status": "error", "message": body.message, "error_type": body.error_type.as_str()})
            }),
        }
    }
}

impl From<ToolResponse> for Value {
    fn from(response: ToolResponse) -> Self {
        match response {
            ToolResponse::Success(value) => value,
            error => error.to_json(),
        }
    }
}

/// `send_post` reads as "send post" in messages.
fn display_name(operation: &str) -> String {
    operation.replace('_', " ")
}
