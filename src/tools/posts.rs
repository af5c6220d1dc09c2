use super::{created, Args, ToolRegistry};
use crate::error::ToolError;
use crate::pipeline::{handler, OperationConfig, ToolRequest};
use crate::rate_limit::registry::POSTS;
use crate::validation::Rule;
use serde_json::{json, Value};

pub fn register(registry: &mut ToolRegistry) {
    registry.register(
        OperationConfig::new("send_post").category(POSTS).validate("text", Rule::PostContent).max_retries(2),
        handler(send_post),
    );
    registry.register(OperationConfig::new("get_post").category(POSTS), handler(get_post));
    registry.register(OperationConfig::new("get_posts").category(POSTS), handler(get_posts));
    registry.register(
        OperationConfig::new("delete_post").category(POSTS).validate("uri", Rule::AtUri),
        handler(delete_post),
    );
}

async fn send_post(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let post = Args(&req.args).new_post()?;
    let record = client.send_post(post).await?;
    Ok(created("Post sent successfully", "post", record))
}

async fn get_post(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let args = Args(&req.args);
    let rkey = args.str("post_rkey")?;
    let author = args.opt_str("profile_identify")?;
    let cid = args.opt_str("cid")?;
    let post = client.get_post(&rkey, author.as_deref(), cid.as_deref()).await?;
    Ok(json!({ "status": "success", "post": post }))
}

async fn get_posts(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let uris = Args(&req.args).str_list("uris")?;
    let posts = client.get_posts(&uris).await?;
    Ok(json!({ "status": "success", "posts": posts }))
}

async fn delete_post(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let uri = Args(&req.args).str("uri")?;
    client.delete_post(&uri).await?;
    Ok(json!({ "status": "success", "message": "Post deleted successfully" }))
}
