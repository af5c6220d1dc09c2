//! Error taxonomy for guarded tool calls.
//!
//! Denials and invalid input are ordinary values of [`ToolError`]; the pipeline's outer stage
//! turns every one of them into a structured [`ToolResponse`](crate::response::ToolResponse).

use crate::client::ClientError;
use crate::media::MediaError;
use crate::rate_limit::RateLimitExceeded;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Failure of a guarded tool call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    /// Admission denied; never retried within the same call.
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),
    /// Caller-supplied input rejected; never retried.
    #[error("{detail}")]
    Validation { param: String, detail: String },
    /// No authenticated session could be obtained.
    #[error("{0}")]
    Authentication(String),
    /// The operation failed in a way that retrying cannot fix.
    #[error("{0}")]
    Permanent(String),
    /// Any other failure from the wrapped operation.
    #[error("{0}")]
    Operation(String),
}

impl ToolError {
    pub fn validation(param: impl Into<String>, reason: impl fmt::Display) -> Self {
        let param = param.into();
        let detail = format!("Invalid {param}: {reason}");
        ToolError::Validation { param, detail }
    }

    pub fn operation(message: impl Into<String>) -> Self {
        ToolError::Operation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::RateLimited(_) => ErrorKind::RateLimit,
            ToolError::Validation { .. } => ErrorKind::Validation,
            ToolError::Authentication(_) => ErrorKind::Authentication,
            ToolError::Permanent(_) | ToolError::Operation(_) => ErrorKind::Generic,
        }
    }

    /// Transient failures only: an `Operation` whose message does not mention
    /// "permanent" or "invalid" (any case).
    pub fn is_retryable(&self) -> bool {
        match self {
            ToolError::Operation(message) => {
                let lower = message.to_lowercase();
                !(lower.contains("permanent") || lower.contains("invalid"))
            }
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ToolError::RateLimited(e) => Some(e.retry_after),
            _ => None,
        }
    }
}

impl From<ClientError> for ToolError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Unauthorized(_) => ToolError::Authentication(err.to_string()),
            ref e if e.is_transient() => ToolError::Operation(e.to_string()),
            other => ToolError::Permanent(other.to_string()),
        }
    }
}

impl From<MediaError> for ToolError {
    fn from(err: MediaError) -> Self {
        ToolError::validation("media", err)
    }
}

/// Error-kind tag carried by structured error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    RateLimit,
    Authentication,
    Generic,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Generic => "generic",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
