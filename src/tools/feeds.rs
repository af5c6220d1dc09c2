use super::{Args, ToolRegistry};
use crate::client::AuthorFeedQuery;
use crate::error::ToolError;
use crate::pipeline::{handler, OperationConfig, ToolRequest};
use crate::validation::Rule;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

/// Popular posts scanned by `get_trends`.
const POPULAR_SAMPLE: u32 = 100;
/// Tags reported by `get_trends`.
const TOP_TRENDS: usize = 20;

pub fn register(registry: &mut ToolRegistry) {
    registry.register(OperationConfig::new("get_timeline").validate("limit", Rule::Limit), handler(get_timeline));
    registry.register(
        OperationConfig::new("get_author_feed").validate("limit", Rule::Limit),
        handler(get_author_feed),
    );
    registry.register(
        OperationConfig::new("get_post_thread").validate("uri", Rule::AtUri),
        handler(get_post_thread),
    );
    registry.register(OperationConfig::new("get_trends"), handler(get_trends));
    registry.register(OperationConfig::new("get_pinned_feeds"), handler(get_pinned_feeds));
}

async fn get_timeline(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let args = Args(&req.args);
    let algorithm = args.opt_str("algorithm")?;
    let timeline = client.get_timeline(algorithm.as_deref(), args.page()?).await?;
    Ok(json!({ "status": "success", "timeline": timeline }))
}

async fn get_author_feed(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let args = Args(&req.args);
    let query = AuthorFeedQuery {
        filter: args.opt_str("filter")?,
        include_pins: args.bool_or("include_pins", false)?,
        page: args.page()?,
    };
    let feed = client.get_author_feed(&args.str("actor")?, query).await?;
    Ok(json!({ "status": "success", "feed": feed }))
}

async fn get_post_thread(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let args = Args(&req.args);
    let uri = args.str("uri")?;
    let thread = client.get_post_thread(&uri, args.opt_u32("depth")?, args.opt_u32("parent_height")?).await?;
    Ok(json!({ "status": "success", "thread": thread }))
}

async fn get_trends(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let popular = client.get_popular(POPULAR_SAMPLE).await?;
    let trends: Vec<Value> = trending_tags(&popular, TOP_TRENDS)
        .into_iter()
        .map(|(tag, count)| json!({ "tag": tag, "count": count }))
        .collect();
    Ok(json!({ "status": "success", "trends": trends }))
}

/// Saved feed generators with their details. Feeds whose details cannot be fetched are skipped.
async fn get_pinned_feeds(req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let mut pinned = Vec::new();
    for uri in client.get_saved_feeds().await? {
        if !feed_generator_pattern().is_match(&uri) {
            continue;
        }
        match client.get_feed_generator(&uri).await {
            Ok(info) => pinned.push(json!({ "uri": uri, "info": info })),
            Err(err) => warn!(target: "skyguard::pipeline", feed = %uri, error = %err, "skipping pinned feed"),
        }
    }
    Ok(json!({ "status": "success", "pinned_feeds": pinned }))
}

/// Hashtags in the post texts of a feed payload, lowercased, most used first.
///
/// Ties keep the order in which tags were first seen.
pub fn trending_tags(feed: &Value, top: usize) -> Vec<(String, u32)> {
    let mut counts: Vec<(String, u32)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let texts = feed["feed"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| item["post"]["record"]["text"].as_str());
    for text in texts {
        for caps in hashtag_pattern().captures_iter(text) {
            let tag = caps[1].to_lowercase();
            match index.get(&tag) {
                Some(&i) => counts[i].1 += 1,
                None => {
                    index.insert(tag.clone(), counts.len());
                    counts.push((tag, 1));
                }
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(top);
    counts
}

fn hashtag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"#(\w+)").expect("hashtag pattern compiles"))
}

fn feed_generator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^at://[^/]+/app\.bsky\.feed\.generator/[^/]+").expect("feed generator pattern compiles")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(texts: &[&str]) -> Value {
        let items: Vec<Value> = texts.iter().map(|t| json!({ "post": { "record": { "text": t } } })).collect();
        json!({ "feed": items })
    }

    #[test]
    fn tags_are_counted_case_insensitively() {
        let popular = feed(&["#Rust and #tokio", "more #rust", "#TOKIO #rust", "no tags here"]);
        assert_eq!(trending_tags(&popular, 20), vec![("rust".to_string(), 3), ("tokio".to_string(), 2)]);
    }

    #[test]
    fn ties_keep_first_seen_order_and_top_truncates() {
        let popular = feed(&["#b #a", "#c"]);
        let tags: Vec<String> = trending_tags(&popular, 2).into_iter().map(|(t, _)| t).collect();
        assert_eq!(tags, vec!["b", "a"]);
    }

    #[test]
    fn malformed_items_are_ignored() {
        let popular = json!({ "feed": [{ "post": {} }, { "reason": "pin" }, 7] });
        assert!(trending_tags(&popular, 20).is_empty());
        assert!(trending_tags(&json!({}), 20).is_empty());
    }
}
