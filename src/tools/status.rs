//! Introspection tools. Neither requires a session.

use super::ToolRegistry;
use crate::auth::AuthProvider;
use crate::error::ToolError;
use crate::pipeline::{handler, OperationConfig, ToolRequest};
use crate::queue::RequestQueue;
use crate::rate_limit::AdmissionController;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn register(registry: &mut ToolRegistry) {
    let auth = registry.runtime().auth.clone();
    registry.register(
        OperationConfig::new("check_auth_status").requires_auth(false),
        handler(move |_req: ToolRequest| check_auth_status(auth.clone())),
    );

    let controller = registry.runtime().controller.clone();
    let queue = registry.runtime().queue.clone();
    registry.register(
        OperationConfig::new("rate_limit_status").requires_auth(false),
        handler(move |_req: ToolRequest| rate_limit_status(controller.clone(), queue.clone())),
    );
}

/// Logs in if needed. A failed login is reported, not raised.
async fn check_auth_status(auth: Option<Arc<dyn AuthProvider>>) -> Result<Value, ToolError> {
    let Some(provider) = auth else {
        return Ok(json!({ "authenticated": false, "message": "Not authenticated: no credentials configured" }));
    };
    Ok(match provider.resolve().await {
        Ok(client) => json!({
            "authenticated": true,
            "handle": client.handle(),
            "message": format!("Authenticated to {}", client.service_url()),
        }),
        Err(err) => json!({ "authenticated": false, "message": format!("Not authenticated: {err}") }),
    })
}

async fn rate_limit_status(controller: Arc<AdmissionController>, queue: RequestQueue) -> Result<Value, ToolError> {
    Ok(json!({ "rate_limits": controller.status(), "queue": queue.status() }))
}
