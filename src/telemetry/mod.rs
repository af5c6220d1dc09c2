//! Telemetry for guarded calls.
//!
//! Stages emit [`GuardEvent`]s to a [`TelemetrySink`], which is a
//! `tower::Service<GuardEvent>` so sinks compose with ordinary tower combinators. Emission is
//! best effort: a failing sink never changes the outcome of a call.
//!
//! The stages themselves hold a [`Telemetry`] handle, which erases the sink type.

pub mod events;
pub mod sinks;

pub use events::{event_to_json, GuardEvent, Outcome};
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink, TelemetrySink};

use futures::future::BoxFuture;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

type EmitFn = dyn Fn(GuardEvent) -> BoxFuture<'static, ()> + Send + Sync;

/// Cloneable, type-erased handle to a sink.
#[derive(Clone)]
pub struct Telemetry {
    emit: Arc<EmitFn>,
    name: &'static str,
}

impl Telemetry {
    pub fn new<S>(sink: S) -> Self
    where
        S: TelemetrySink,
        S::Future: Send + 'static,
    {
        let sink = Mutex::new(sink);
        Self {
            emit: Arc::new(move |event| {
                let sink = sink.lock().unwrap_or_else(PoisonError::into_inner).clone();
                Box::pin(emit_best_effort(sink, event))
            }),
            name: std::any::type_name::<S>(),
        }
    }

    /// A handle that drops every event.
    pub fn null() -> Self {
        Self::new(NullSink)
    }

    pub async fn emit(&self, event: GuardEvent) {
        (self.emit)(event).await
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry").field("sink", &self.name).finish()
    }
}
