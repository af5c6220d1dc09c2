//! The social-network capability the tools call into.
//!
//! Only the boundary lives here. A concrete client (HTTP, XRPC, a test double) implements
//! [`SocialClient`] and is handed to the pipeline by an [`AuthProvider`](crate::auth::AuthProvider).
//! Fetch operations return raw JSON payloads; the tools pass them through untouched.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reference to a record created on the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRef {
    pub uri: String,
    pub cid: String,
}

impl RecordRef {
    pub fn new(uri: impl Into<String>, cid: impl Into<String>) -> Self {
        Self { uri: uri.into(), cid: cid.into() }
    }
}

/// Text and optional structure for a new post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPost {
    pub text: String,
    /// Handle or DID to post as; the session's own profile when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// `{ "root": {uri, cid}, "parent": {uri, cid} }`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub langs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<Value>,
}

impl NewPost {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }
}

/// Decoded media bytes plus alt text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUpload {
    pub bytes: Vec<u8>,
    pub alt: String,
}

/// Cursor pagination shared by list endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

/// Options for [`SocialClient::get_author_feed`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorFeedQuery {
    pub filter: Option<String>,
    pub include_pins: bool,
    pub page: Page,
}

/// Ordering for [`SocialClient::search_posts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PostSort {
    /// Relevance, the service default.
    #[default]
    Top,
    /// Most recent first.
    Latest,
}

impl PostSort {
    /// `"latest"` in any case selects [`PostSort::Latest`]; anything else is [`PostSort::Top`].
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("latest") {
            PostSort::Latest
        } else {
            PostSort::Top
        }
    }
}

/// Failures reported by a [`SocialClient`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Whether trying again could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport(_) => true,
            ClientError::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }
}

/// An authenticated session against the network.
#[async_trait]
pub trait SocialClient: Send + Sync {
    /// Base URL of the service this session is bound to.
    fn service_url(&self) -> &str;

    /// Handle of the logged-in account.
    fn handle(&self) -> &str;

    async fn send_post(&self, post: NewPost) -> Result<RecordRef, ClientError>;
    async fn get_post(
        &self,
        rkey: &str,
        author: Option<&str>,
        cid: Option<&str>,
    ) -> Result<Value, ClientError>;
    async fn get_posts(&self, uris: &[String]) -> Result<Value, ClientError>;
    async fn delete_post(&self, uri: &str) -> Result<(), ClientError>;

    async fn like(&self, uri: &str, cid: &str) -> Result<RecordRef, ClientError>;
    async fn unlike(&self, like_uri: &str) -> Result<(), ClientError>;
    async fn repost(&self, uri: &str, cid: &str) -> Result<RecordRef, ClientError>;
    async fn unrepost(&self, repost_uri: &str) -> Result<bool, ClientError>;
    async fn get_likes(&self, uri: &str, page: Page) -> Result<Value, ClientError>;
    async fn get_reposted_by(
        &self,
        uri: &str,
        cid: Option<&str>,
        page: Page,
    ) -> Result<Value, ClientError>;
    /// Posts liked by `actor`.
    async fn get_actor_likes(&self, actor: &str, page: Page) -> Result<Value, ClientError>;

    async fn get_profile(&self, actor: &str) -> Result<Value, ClientError>;
    async fn get_follows(&self, actor: &str, page: Page) -> Result<Value, ClientError>;
    async fn get_followers(&self, actor: &str, page: Page) -> Result<Value, ClientError>;
    /// Resolve a handle to its DID.
    async fn resolve_handle(&self, handle: &str) -> Result<String, ClientError>;
    async fn follow(&self, did: &str) -> Result<RecordRef, ClientError>;
    async fn unfollow(&self, follow_uri: &str) -> Result<bool, ClientError>;
    async fn mute(&self, actor: &str) -> Result<bool, ClientError>;
    async fn unmute(&self, actor: &str) -> Result<bool, ClientError>;

    async fn get_timeline(&self, algorithm: Option<&str>, page: Page) -> Result<Value, ClientError>;
    async fn get_author_feed(&self, actor: &str, query: AuthorFeedQuery) -> Result<Value, ClientError>;
    async fn get_post_thread(
        &self,
        uri: &str,
        depth: Option<u32>,
        parent_height: Option<u32>,
    ) -> Result<Value, ClientError>;

    /// Popular posts across the network, as a feed payload.
    async fn get_popular(&self, limit: u32) -> Result<Value, ClientError>;
    /// URIs of the feeds saved in the account's preferences.
    async fn get_saved_feeds(&self) -> Result<Vec<String>, ClientError>;
    async fn get_feed_generator(&self, uri: &str) -> Result<Value, ClientError>;

    async fn search_posts(&self, query: &str, sort: PostSort, page: Page) -> Result<Value, ClientError>;
    async fn search_actors(&self, term: &str, page: Page) -> Result<Value, ClientError>;
    async fn search_feeds(&self, query: &str, page: Page) -> Result<Value, ClientError>;

    async fn send_images(&self, post: NewPost, images: Vec<MediaUpload>) -> Result<RecordRef, ClientError>;
    async fn send_video(&self, post: NewPost, video: MediaUpload) -> Result<RecordRef, ClientError>;
}
