#![allow(missing_docs)]

mod common;

use common::test_helpers::MockClient;
use serde_json::json;
use skyguard::pipeline::{Guard, Runtime};
use skyguard::{AdmissionController, CategoryRegistry, ErrorKind, StaticSession, ToolRegistry};
use std::sync::Arc;

fn catalog(client: MockClient) -> (ToolRegistry, Arc<MockClient>) {
    let client = Arc::new(client);
    let runtime = Runtime::new(Arc::new(AdmissionController::new(CategoryRegistry::default())))
        .with_auth(StaticSession(client.clone()));
    (ToolRegistry::with_default_tools(runtime), client)
}

#[test]
fn every_tool_is_registered() {
    let (tools, _) = catalog(MockClient::new("alice.test"));
    let expected = [
        "check_auth_status",
        "convert_url_to_uri",
        "delete_post",
        "follow_user",
        "get_author_feed",
        "get_followers",
        "get_follows",
        "get_liked_posts",
        "get_likes",
        "get_pinned_feeds",
        "get_post",
        "get_post_thread",
        "get_posts",
        "get_profile",
        "get_reposted_by",
        "get_timeline",
        "get_trends",
        "like_post",
        "mute_user",
        "rate_limit_status",
        "repost",
        "resolve_handle",
        "search_feeds",
        "search_people",
        "search_posts",
        "send_image",
        "send_images",
        "send_post",
        "send_video",
        "unfollow_user",
        "unlike_post",
        "unmute_user",
        "unrepost",
    ];
    assert_eq!(tools.names().collect::<Vec<_>>(), expected);
    assert_eq!(tools.len(), expected.len());
}

#[test]
fn write_tools_use_their_own_categories() {
    let (tools, _) = catalog(MockClient::new("alice.test"));
    let category = |name: &str| tools.get(name).unwrap().config().rate_category().to_string();
    assert_eq!(category("send_post"), "posts");
    assert_eq!(category("follow_user"), "follows");
    assert_eq!(category("like_post"), "likes");
    assert_eq!(category("repost"), "reposts");
    assert_eq!(category("send_images"), "media");
    assert_eq!(category("get_timeline"), "general");

    let status = tools.get("check_auth_status").unwrap();
    assert!(!status.stages().contains(&Guard::Authenticate));
    assert!(tools.get("send_post").unwrap().stages().contains(&Guard::Retry));
}

#[tokio::test]
async fn follow_resolves_the_handle_first() {
    let (tools, client) = catalog(MockClient::new("alice.test"));

    let response = tools.call("follow_user", json!({ "handle": "@bob.test" })).await.to_json();

    assert_eq!(response["message"], "Now following bob.test");
    assert_eq!(response["follow_uri"], "at://did:plc:alice.test/app.bsky.graph.follow/1");
    assert_eq!(response["follow_cid"], "cid1");
    assert_eq!(client.calls(), vec!["resolve_handle", "follow"]);
}

#[tokio::test]
async fn unconfirmed_unrepost_is_an_error() {
    let (tools, _) = catalog(MockClient::new("alice.test").refusing_changes());

    let response = tools.call("unrepost", json!({ "repost_uri": "at://did:plc:a/app.bsky.feed.repost/1" })).await;

    assert_eq!(response.to_json()["message"], "Failed to unrepost: the server did not confirm the change");
    assert_eq!(response.error_type(), Some(ErrorKind::Generic));
}

#[tokio::test]
async fn profile_defaults_to_the_session_handle() {
    let (tools, _) = catalog(MockClient::new("alice.test"));

    let mine = tools.call("get_profile", json!({})).await.to_json();
    let theirs = tools.call("get_profile", json!({ "handle": "@bob.test" })).await.to_json();

    assert_eq!(mine["profile"]["handle"], "alice.test");
    assert_eq!(theirs["profile"]["handle"], "bob.test");
}

#[tokio::test]
async fn limits_are_clamped_before_reaching_the_client() {
    let (tools, _) = catalog(MockClient::new("alice.test"));

    let large = tools.call("get_follows", json!({ "limit": 500 })).await.to_json();
    let default = tools.call("get_followers", json!({})).await.to_json();
    let bad = tools.call("get_follows", json!({ "limit": "lots" })).await;

    assert_eq!(large["follows"]["limit"], 100);
    assert_eq!(default["followers"]["limit"], 50);
    assert_eq!(bad.error_type(), Some(ErrorKind::Validation));
}

#[tokio::test]
async fn too_many_images_never_reach_the_client() {
    let (tools, client) = catalog(MockClient::new("alice.test"));
    let images = vec!["aGk="; 5];

    let response = tools.call("send_images", json!({ "text": "gallery", "images_data": images })).await;

    assert_eq!(response.to_json()["message"], "Failed to send images: Invalid media: Maximum of 4 images allowed");
    assert_eq!(response.error_type(), Some(ErrorKind::Validation));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn single_image_post_reports_the_new_record() {
    let (tools, client) = catalog(MockClient::new("alice.test"));

    let response = tools
        .call("send_image", json!({ "text": "look", "image_data": "aGk=", "image_alt": "a greeting" }))
        .await
        .to_json();

    assert_eq!(response["status"], "success");
    assert_eq!(response["message"], "Post with image created successfully");
    assert_eq!(response["post_uri"], "at://did:plc:alice.test/app.bsky.feed.post/1");
    assert_eq!(client.count("send_images"), 1);
}

#[tokio::test]
async fn uri_arguments_must_use_the_at_scheme() {
    let (tools, client) = catalog(MockClient::new("alice.test"));

    let response = tools.call("delete_post", json!({ "uri": "https://bsky.app/post/1" })).await;

    assert_eq!(response.to_json()["message"], "Failed to delete post: Invalid uri: URI must start with 'at://'");
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn non_object_arguments_are_rejected() {
    let (tools, _) = catalog(MockClient::new("alice.test"));
    let response = tools.call("get_timeline", json!([1, 2, 3])).await;
    assert_eq!(response.error_type(), Some(ErrorKind::Validation));
}

#[tokio::test]
async fn rate_limit_status_reports_every_window_and_the_queue() {
    let (tools, _) = catalog(MockClient::new("alice.test"));
    tools.call("get_timeline", json!({})).await;

    let status = tools.call("rate_limit_status", json!({})).await.to_json();

    assert_eq!(status["rate_limits"]["general"]["allowed"], 120);
    // the status call holds its own slot by the time it reports
    assert_eq!(status["rate_limits"]["general"]["used"], 2);
    assert_eq!(status["rate_limits"]["global"]["used"], 2);
    assert_eq!(status["queue"]["max_concurrent"], 5);
    assert_eq!(status["queue"]["active"], 1);
}

#[tokio::test]
async fn post_links_convert_through_the_handle() {
    let (tools, client) = catalog(MockClient::new("alice.test"));

    let post = tools
        .call("convert_url_to_uri", json!({ "url": "https://bsky.app/profile/test.bsky.social/post/abcdef123" }))
        .await
        .to_json();
    let profile =
        tools.call("convert_url_to_uri", json!({ "url": "https://bsky.app/profile/test.bsky.social" })).await.to_json();

    assert_eq!(post, json!({ "status": "success", "uri": "at://did:plc:test.bsky.social/app.bsky.feed.post/abcdef123" }));
    assert_eq!(profile["uri"], "did:plc:test.bsky.social");
    assert_eq!(client.calls(), vec!["resolve_handle", "resolve_handle"]);
}

#[tokio::test]
async fn did_links_skip_resolution_and_foreign_links_fail() {
    let (tools, client) = catalog(MockClient::new("alice.test"));

    let did = tools
        .call("convert_url_to_uri", json!({ "url": "https://bsky.app/profile/did:plc:xyz/post/3k" }))
        .await
        .to_json();
    let foreign = tools.call("convert_url_to_uri", json!({ "url": "https://example.com/invalid" })).await;

    assert_eq!(did["uri"], "at://did:plc:xyz/app.bsky.feed.post/3k");
    assert_eq!(foreign.error_type(), Some(ErrorKind::Validation));
    assert_eq!(foreign.to_json()["message"], "Failed to convert url to uri: Invalid url: Unsupported URL format");
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn search_tools_default_to_smaller_pages() {
    let (tools, client) = catalog(MockClient::new("alice.test"));

    let posts = tools.call("search_posts", json!({ "query": "rust", "sort": "Latest" })).await.to_json();
    let people = tools.call("search_people", json!({ "query": "alice", "limit": 0 })).await.to_json();
    let feeds = tools.call("search_feeds", json!({ "query": "art", "limit": 500 })).await.to_json();
    let missing = tools.call("search_posts", json!({})).await;

    assert_eq!(posts["search_results"]["sort"], "latest");
    assert_eq!(posts["search_results"]["limit"], 25);
    assert_eq!(people["search_results"]["term"], "alice");
    assert_eq!(people["search_results"]["limit"], 1);
    assert_eq!(feeds["search_results"]["limit"], 100);
    assert_eq!(missing.to_json()["message"], "Failed to search posts: Missing required parameter 'query'");
    assert_eq!(client.calls(), vec!["search_posts", "search_actors", "search_feeds"]);
}

#[tokio::test]
async fn liked_posts_default_to_the_session_handle() {
    let (tools, _) = catalog(MockClient::new("alice.test"));

    let mine = tools.call("get_liked_posts", json!({})).await.to_json();
    let theirs = tools.call("get_liked_posts", json!({ "handle": "@bob.test", "limit": 10 })).await.to_json();

    assert_eq!(mine["likes"]["actor"], "alice.test");
    assert_eq!(mine["likes"]["limit"], 50);
    assert_eq!(theirs["likes"]["actor"], "bob.test");
    assert_eq!(theirs["likes"]["limit"], 10);
}

#[tokio::test]
async fn trends_count_hashtags_in_popular_posts() {
    let (tools, client) = catalog(MockClient::new("alice.test"));

    let response = tools.call("get_trends", json!({})).await.to_json();

    assert_eq!(
        response["trends"],
        json!([{ "tag": "rust", "count": 2 }, { "tag": "tokio", "count": 2 }])
    );
    assert_eq!(client.calls(), vec!["get_popular"]);
}

#[tokio::test]
async fn pinned_feeds_skip_lists_and_unreachable_generators() {
    let (tools, client) = catalog(MockClient::new("alice.test"));

    let response = tools.call("get_pinned_feeds", json!({})).await.to_json();

    assert_eq!(response["status"], "success");
    let pinned = response["pinned_feeds"].as_array().unwrap();
    assert_eq!(pinned.len(), 1);
    assert_eq!(pinned[0]["uri"], "at://did:plc:feeds/app.bsky.feed.generator/whats-hot");
    assert_eq!(pinned[0]["info"]["displayName"], "What's Hot");
    assert_eq!(client.count("get_feed_generator"), 2);
}
