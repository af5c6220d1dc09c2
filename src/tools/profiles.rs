//! Profile and social-graph tools. Handles default to the session's own account.

use super::{confirmed, created, Args, ToolRegistry};
use crate::error::ToolError;
use crate::pipeline::{handler, OperationConfig, ToolRequest};
use crate::rate_limit::registry::FOLLOWS;
use crate::validation::Rule;
use serde_json::{json, Value};

pub fn register(registry: &mut ToolRegistry) {
    registry.register(OperationConfig::new("get_profile").validate("handle", Rule::UserHandle), handler(get_profile));
    registry.register(
        OperationConfig::new("get_follows").validate("handle", Rule::UserHandle).validate("limit", Rule::Limit),
        handler(get_follows),
    );
    registry.register(
        OperationConfig::new("get_followers").validate("handle", Rule::UserHandle).validate("limit", Rule::Limit),
        handler(get_followers),
    );
    registry.register(
        OperationConfig::new("resolve_handle").validate("handle", Rule::UserHandle),
        handler(resolve_handle),
    );
    registry.register(
        OperationConfig::new("follow_user").category(FOLLOWS).validate("handle", Rule::UserHandle),
        handler(follow_user),
    );
    registry.register(
        OperationConfig::new("unfollow_user").category(FOLLOWS).validate("follow_uri", Rule::AtUri),
        handler(unfollow_user),
    );
    // actors may be DIDs, which the handle rule rejects
    registry.register(OperationConfig::new("mute_user"), handler(mute_user));
    registry.register(OperationConfig::new("unmute_user"), handler(unmute_user));
}

async fn get_profile(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let handle = Args(&req.args).opt_str("handle")?.unwrap_or_else(|| client.handle().to_string());
    let profile = client.get_profile(&handle).await?;
    Ok(json!({ "status": "success", "profile": profile }))
}

async fn get_follows(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let args = Args(&req.args);
    let handle = args.opt_str("handle")?.unwrap_or_else(|| client.handle().to_string());
    let follows = client.get_follows(&handle, args.page()?).await?;
    Ok(json!({ "status": "success", "follows": follows }))
}

async fn get_followers(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let args = Args(&req.args);
    let handle = args.opt_str("handle")?.unwrap_or_else(|| client.handle().to_string());
    let followers = client.get_followers(&handle, args.page()?).await?;
    Ok(json!({ "status": "success", "followers": followers }))
}

async fn resolve_handle(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let handle = Args(&req.args).str("handle")?;
    let did = client.resolve_handle(&handle).await?;
    Ok(json!({ "status": "success", "handle": handle, "did": did }))
}

async fn follow_user(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let handle = Args(&req.args).str("handle")?;
    let did = client.resolve_handle(&handle).await?;
    let record = client.follow(&did).await?;
    Ok(created(&format!("Now following {handle}"), "follow", record))
}

async fn unfollow_user(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let done = client.unfollow(&Args(&req.args).str("follow_uri")?).await?;
    confirmed(done, "Successfully unfollowed user")
}

async fn mute_user(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let actor = Args(&req.args).str("actor")?;
    let done = client.mute(&actor).await?;
    confirmed(done, &format!("Muted {actor}"))
}

async fn unmute_user(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let actor = Args(&req.args).str("actor")?;
    let done = client.unmute(&actor).await?;
    confirmed(done, &format!("Unmuted {actor}"))
}
