//! Search tools and web URL conversion.

use super::{Args, ToolRegistry};
use crate::client::PostSort;
use crate::error::ToolError;
use crate::pipeline::{handler, OperationConfig, ToolRequest};
use crate::validation::Rule;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

/// Page size for search tools called without `limit`.
pub const SEARCH_LIMIT: u32 = 25;

pub fn register(registry: &mut ToolRegistry) {
    registry.register(
        OperationConfig::new("search_posts").validate("limit", Rule::Limit),
        handler(search_posts),
    );
    registry.register(
        OperationConfig::new("search_people").validate("limit", Rule::Limit),
        handler(search_people),
    );
    registry.register(
        OperationConfig::new("search_feeds").validate("limit", Rule::Limit),
        handler(search_feeds),
    );
    registry.register(OperationConfig::new("convert_url_to_uri"), handler(convert_url_to_uri));
}

async fn search_posts(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let args = Args(&req.args);
    let sort = args.opt_str("sort")?.map(|s| PostSort::parse(&s)).unwrap_or_default();
    let results = client.search_posts(&args.str("query")?, sort, args.page_or(SEARCH_LIMIT)?).await?;
    Ok(json!({ "status": "success", "search_results": results }))
}

async fn search_people(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let args = Args(&req.args);
    let results = client.search_actors(&args.str("query")?, args.page_or(SEARCH_LIMIT)?).await?;
    Ok(json!({ "status": "success", "search_results": results }))
}

async fn search_feeds(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let args = Args(&req.args);
    let results = client.search_feeds(&args.str("query")?, args.page_or(SEARCH_LIMIT)?).await?;
    Ok(json!({ "status": "success", "search_results": results }))
}

async fn convert_url_to_uri(req: ToolRequest) -> Result<Value, ToolError> {
    let url = Args(&req.args).str("url")?;
    let target = WebUrl::parse(&url).ok_or_else(|| ToolError::validation("url", "Unsupported URL format"))?;

    let client = req.client()?;
    let did = match target.actor() {
        actor if actor.starts_with("did:") => actor.to_string(),
        handle => client.resolve_handle(handle).await?,
    };
    let uri = match target {
        WebUrl::Post { rkey, .. } => format!("at://{did}/app.bsky.feed.post/{rkey}"),
        WebUrl::Profile { .. } => did,
    };
    Ok(json!({ "status": "success", "uri": uri }))
}

/// A bsky.app link the conversion tool understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebUrl {
    Post { actor: String, rkey: String },
    Profile { actor: String },
}

impl WebUrl {
    /// Recognise `https://bsky.app/profile/{actor}/post/{rkey}` and `https://bsky.app/profile/{actor}`.
    pub fn parse(url: &str) -> Option<Self> {
        let (post, profile) = web_patterns();
        if let Some(caps) = post.captures(url) {
            return Some(WebUrl::Post { actor: caps[1].to_string(), rkey: caps[2].to_string() });
        }
        profile.captures(url).map(|caps| WebUrl::Profile { actor: caps[1].to_string() })
    }

    /// Handle or DID from the path.
    pub fn actor(&self) -> &str {
        match self {
            WebUrl::Post { actor, .. } | WebUrl::Profile { actor } => actor,
        }
    }
}

fn web_patterns() -> &'static (Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        (
            Regex::new(r"^https?://(?:www\.)?bsky\.app/profile/([^/]+)/post/([^/?#]+)")
                .expect("post url pattern compiles"),
            Regex::new(r"^https?://(?:www\.)?bsky\.app/profile/([^/?#]+)").expect("profile url pattern compiles"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_links_carry_actor_and_record_key() {
        let url = WebUrl::parse("https://bsky.app/profile/test.bsky.social/post/abcdef123").unwrap();
        assert_eq!(url, WebUrl::Post { actor: "test.bsky.social".into(), rkey: "abcdef123".into() });
        assert_eq!(url.actor(), "test.bsky.social");
    }

    #[test]
    fn profile_links_and_www_prefix() {
        assert_eq!(
            WebUrl::parse("http://www.bsky.app/profile/did:plc:abc"),
            Some(WebUrl::Profile { actor: "did:plc:abc".into() })
        );
        assert_eq!(
            WebUrl::parse("https://bsky.app/profile/alice.test?tab=likes"),
            Some(WebUrl::Profile { actor: "alice.test".into() })
        );
    }

    #[test]
    fn other_links_are_not_recognised() {
        assert_eq!(WebUrl::parse("https://example.com/invalid"), None);
        assert_eq!(WebUrl::parse("https://bsky.app/search?q=rust"), None);
        assert_eq!(WebUrl::parse("at://did:plc:abc/app.bsky.feed.post/1"), None);
    }
}
