use crate::error::ErrorKind;
use serde_json::json;
use std::fmt;
use std::time::Duration;

/// Events emitted by the guard stages and the request queue.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardEvent {
    /// The admission stage let a call through.
    Admitted { category: String, remaining: u32 },
    /// The admission stage turned a call away.
    Denied { category: String, retry_after: Duration },
    /// The retry stage is about to wait and try again (`attempt` is 1-indexed).
    RetryAttempt { category: String, attempt: u32, delay: Duration },
    /// The usage stage saw the operation finish.
    Completed { operation: String, usage: String, outcome: Outcome, duration: Duration },
    /// A queue slot was granted.
    QueueAcquired { active: usize, max_concurrent: usize },
}

/// How a completed operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(ErrorKind),
}

impl fmt::Display for GuardEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardEvent::Admitted { category, remaining } => {
                write!(f, "Admitted({}, remaining={})", category, remaining)
            }
            GuardEvent::Denied { category, retry_after } => {
                write!(f, "Denied({}, retry_after={:?})", category, retry_after)
            }
            GuardEvent::RetryAttempt { category, attempt, delay } => {
                write!(f, "RetryAttempt({}, #{}, delay={:?})", category, attempt, delay)
            }
            GuardEvent::Completed { operation, usage, outcome, duration } => {
                write!(f, "Completed({}/{}, {}, duration={:?})", usage, operation, outcome, duration)
            }
            GuardEvent::QueueAcquired { active, max_concurrent } => {
                write!(f, "QueueAcquired({}/{})", active, max_concurrent)
            }
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failure(kind) => write!(f, "failure:{}", kind),
        }
    }
}

#[inline]
fn clamp_u64(val: u128) -> u64 {
    val.min(u128::from(u64::MAX)) as u64
}

/// Flat JSON form used by file and network sinks.
pub fn event_to_json(event: &GuardEvent) -> serde_json::Value {
    match event {
        GuardEvent::Admitted { category, remaining } => json!({
            "kind": "admitted",
            "category": category,
            "remaining": remaining,
        }),
        GuardEvent::Denied { category, retry_after } => json!({
            "kind": "denied",
            "category": category,
            "retry_after_ms": clamp_u64(retry_after.as_millis()),
        }),
        GuardEvent::RetryAttempt { category, attempt, delay } => json!({
            "kind": "retry_attempt",
            "category": category,
            "attempt": attempt,
            "delay_ms": clamp_u64(delay.as_millis()),
        }),
        GuardEvent::Completed { operation, usage, outcome, duration } => {
            let mut value = json!({
                "kind": "completed",
                "operation": operation,
                "usage": usage,
                "outcome": match outcome { Outcome::Success => "success", Outcome::Failure(_) => "failure" },
                "duration_ms": clamp_u64(duration.as_millis()),
            });
            if let Outcome::Failure(kind) = outcome {
                value["error_type"] = json!(kind.as_str());
            }
            value
        }
        GuardEvent::QueueAcquired { active, max_concurrent } => json!({
            "kind": "queue_acquired",
            "active": active,
            "max": max_concurrent,
        }),
    }
}
