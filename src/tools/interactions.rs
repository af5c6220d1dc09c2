use super::{confirmed, created, Args, ToolRegistry};
use crate::error::ToolError;
use crate::pipeline::{handler, OperationConfig, ToolRequest};
use crate::rate_limit::registry::{LIKES, REPOSTS};
use crate::validation::Rule;
use serde_json::{json, Value};

pub fn register(registry: &mut ToolRegistry) {
    registry.register(
        OperationConfig::new("like_post").category(LIKES).validate("uri", Rule::AtUri),
        handler(like_post),
    );
    registry.register(
        OperationConfig::new("unlike_post").category(LIKES).validate("like_uri", Rule::AtUri),
        handler(unlike_post),
    );
    registry.register(
        OperationConfig::new("repost").category(REPOSTS).validate("uri", Rule::AtUri),
        handler(repost),
    );
    registry.register(
        OperationConfig::new("unrepost").category(REPOSTS).validate("repost_uri", Rule::AtUri),
        handler(unrepost),
    );
    registry.register(
        OperationConfig::new("get_likes").validate("uri", Rule::AtUri).validate("limit", Rule::Limit),
        handler(get_likes),
    );
    registry.register(
        OperationConfig::new("get_reposted_by").validate("uri", Rule::AtUri).validate("limit", Rule::Limit),
        handler(get_reposted_by),
    );
    registry.register(
        OperationConfig::new("get_liked_posts").validate("handle", Rule::UserHandle).validate("limit", Rule::Limit),
        handler(get_liked_posts),
    );
}

async fn like_post(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let args = Args(&req.args);
    let record = client.like(&args.str("uri")?, &args.str("cid")?).await?;
    Ok(created("Post liked successfully", "like", record))
}

async fn unlike_post(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    client.unlike(&Args(&req.args).str("like_uri")?).await?;
    Ok(json!({ "status": "success", "message": "Post unliked successfully" }))
}

async fn repost(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let args = Args(&req.args);
    let record = client.repost(&args.str("uri")?, &args.str("cid")?).await?;
    Ok(created("Post reposted successfully", "repost", record))
}

async fn unrepost(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let done = client.unrepost(&Args(&req.args).str("repost_uri")?).await?;
    confirmed(done, "Repost removed successfully")
}

async fn get_likes(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let args = Args(&req.args);
    let likes = client.get_likes(&args.str("uri")?, args.page()?).await?;
    Ok(json!({ "status": "success", "likes": likes }))
}

async fn get_liked_posts(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let args = Args(&req.args);
    let handle = args.opt_str("handle")?.unwrap_or_else(|| client.handle().to_string());
    let likes = client.get_actor_likes(&handle, args.page()?).await?;
    Ok(json!({ "status": "success", "likes": likes }))
}

async fn get_reposted_by(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let args = Args(&req.args);
    let cid = args.opt_str("cid")?;
    let reposts = client.get_reposted_by(&args.str("uri")?, cid.as_deref(), args.page()?).await?;
    Ok(json!({ "status": "success", "reposts": reposts }))
}
