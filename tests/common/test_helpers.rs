use async_trait::async_trait;
use serde_json::{json, Map, Value};
use skyguard::auth::{Connector, Credentials};
use skyguard::client::{AuthorFeedQuery, ClientError, MediaUpload, NewPost, Page, PostSort, RecordRef, SocialClient};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// In-memory client that records every call and can be scripted to fail.
#[derive(Debug)]
pub struct MockClient {
    handle: String,
    service_url: String,
    calls: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<ClientError>>,
    delay: Option<Duration>,
    confirm: bool,
    created: AtomicU32,
}

impl MockClient {
    pub fn new(handle: &str) -> Self {
        Self {
            handle: handle.to_string(),
            service_url: "https://bsky.social".to_string(),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            delay: None,
            confirm: true,
            created: AtomicU32::new(0),
        }
    }

    pub fn with_service_url(mut self, url: &str) -> Self {
        self.service_url = url.to_string();
        self
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Boolean operations report `false`.
    pub fn refusing_changes(mut self) -> Self {
        self.confirm = false;
        self
    }

    /// The next calls fail with these errors, in order.
    pub fn fail_with(self, errors: impl IntoIterator<Item = ClientError>) -> Self {
        self.failures.lock().unwrap().extend(errors);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.as_str() == method).count()
    }

    async fn enter(&self, method: &str) -> Result<(), ClientError> {
        self.calls.lock().unwrap().push(method.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn record(&self, collection: &str) -> RecordRef {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        RecordRef::new(format!("at://did:plc:{}/{collection}/{n}", self.handle), format!("cid{n}"))
    }
}

#[async_trait]
impl SocialClient for MockClient {
    fn service_url(&self) -> &str {
        &self.service_url
    }

    fn handle(&self) -> &str {
        &self.handle
    }

    async fn send_post(&self, post: NewPost) -> Result<RecordRef, ClientError> {
        self.enter("send_post").await?;
        if post.text.is_empty() {
            return Err(ClientError::InvalidRequest("empty post".into()));
        }
        Ok(self.record("app.bsky.feed.post"))
    }

    async fn get_post(&self, rkey: &str, author: Option<&str>, _cid: Option<&str>) -> Result<Value, ClientError> {
        self.enter("get_post").await?;
        Ok(json!({ "rkey": rkey, "author": author.unwrap_or(&self.handle) }))
    }

    async fn get_posts(&self, uris: &[String]) -> Result<Value, ClientError> {
        self.enter("get_posts").await?;
        Ok(json!({ "posts": uris }))
    }

    async fn delete_post(&self, _uri: &str) -> Result<(), ClientError> {
        self.enter("delete_post").await
    }

    async fn like(&self, _uri: &str, _cid: &str) -> Result<RecordRef, ClientError> {
        self.enter("like").await?;
        Ok(self.record("app.bsky.feed.like"))
    }

    async fn unlike(&self, _like_uri: &str) -> Result<(), ClientError> {
        self.enter("unlike").await
    }

    async fn repost(&self, _uri: &str, _cid: &str) -> Result<RecordRef, ClientError> {
        self.enter("repost").await?;
        Ok(self.record("app.bsky.feed.repost"))
    }

    async fn unrepost(&self, _repost_uri: &str) -> Result<bool, ClientError> {
        self.enter("unrepost").await?;
        Ok(self.confirm)
    }

    async fn get_likes(&self, uri: &str, page: Page) -> Result<Value, ClientError> {
        self.enter("get_likes").await?;
        Ok(json!({ "uri": uri, "limit": page.limit, "likes": [] }))
    }

    async fn get_reposted_by(&self, uri: &str, _cid: Option<&str>, page: Page) -> Result<Value, ClientError> {
        self.enter("get_reposted_by").await?;
        Ok(json!({ "uri": uri, "limit": page.limit, "repostedBy": [] }))
    }

    async fn get_actor_likes(&self, actor: &str, page: Page) -> Result<Value, ClientError> {
        self.enter("get_actor_likes").await?;
        Ok(json!({ "actor": actor, "limit": page.limit, "feed": [] }))
    }

    async fn get_profile(&self, actor: &str) -> Result<Value, ClientError> {
        self.enter("get_profile").await?;
        Ok(json!({ "handle": actor }))
    }

    async fn get_follows(&self, actor: &str, page: Page) -> Result<Value, ClientError> {
        self.enter("get_follows").await?;
        Ok(json!({ "subject": actor, "limit": page.limit, "follows": [] }))
    }

    async fn get_followers(&self, actor: &str, page: Page) -> Result<Value, ClientError> {
        self.enter("get_followers").await?;
        Ok(json!({ "subject": actor, "limit": page.limit, "followers": [] }))
    }

    async fn resolve_handle(&self, handle: &str) -> Result<String, ClientError> {
        self.enter("resolve_handle").await?;
        Ok(format!("did:plc:{handle}"))
    }

    async fn follow(&self, _did: &str) -> Result<RecordRef, ClientError> {
        self.enter("follow").await?;
        Ok(self.record("app.bsky.graph.follow"))
    }

    async fn unfollow(&self, _follow_uri: &str) -> Result<bool, ClientError> {
        self.enter("unfollow").await?;
        Ok(self.confirm)
    }

    async fn mute(&self, _actor: &str) -> Result<bool, ClientError> {
        self.enter("mute").await?;
        Ok(self.confirm)
    }

    async fn unmute(&self, _actor: &str) -> Result<bool, ClientError> {
        self.enter("unmute").await?;
        Ok(self.confirm)
    }

    async fn get_timeline(&self, algorithm: Option<&str>, page: Page) -> Result<Value, ClientError> {
        self.enter("get_timeline").await?;
        Ok(json!({ "algorithm": algorithm, "limit": page.limit, "feed": [] }))
    }

    async fn get_author_feed(&self, actor: &str, query: AuthorFeedQuery) -> Result<Value, ClientError> {
        self.enter("get_author_feed").await?;
        Ok(json!({ "actor": actor, "include_pins": query.include_pins, "feed": [] }))
    }

    async fn get_post_thread(
        &self,
        uri: &str,
        depth: Option<u32>,
        _parent_height: Option<u32>,
    ) -> Result<Value, ClientError> {
        self.enter("get_post_thread").await?;
        Ok(json!({ "uri": uri, "depth": depth }))
    }

    async fn get_popular(&self, limit: u32) -> Result<Value, ClientError> {
        self.enter("get_popular").await?;
        let texts = ["#rust is fun", "learning #Rust with #tokio", "#tokio tips", "no tags"];
        let feed: Vec<Value> = texts.iter().map(|t| json!({ "post": { "record": { "text": t } } })).collect();
        Ok(json!({ "limit": limit, "feed": feed }))
    }

    async fn get_saved_feeds(&self) -> Result<Vec<String>, ClientError> {
        self.enter("get_saved_feeds").await?;
        Ok(vec![
            "at://did:plc:feeds/app.bsky.feed.generator/whats-hot".to_string(),
            "at://did:plc:feeds/app.bsky.graph.list/friends".to_string(),
            "at://did:plc:feeds/app.bsky.feed.generator/gone".to_string(),
        ])
    }

    async fn get_feed_generator(&self, uri: &str) -> Result<Value, ClientError> {
        self.enter("get_feed_generator").await?;
        if uri.ends_with("/gone") {
            return Err(ClientError::NotFound(uri.to_string()));
        }
        Ok(json!({ "uri": uri, "displayName": "What's Hot" }))
    }

    async fn search_posts(&self, query: &str, sort: PostSort, page: Page) -> Result<Value, ClientError> {
        self.enter("search_posts").await?;
        let sort = match sort {
            PostSort::Top => "top",
            PostSort::Latest => "latest",
        };
        Ok(json!({ "q": query, "sort": sort, "limit": page.limit, "posts": [] }))
    }

    async fn search_actors(&self, term: &str, page: Page) -> Result<Value, ClientError> {
        self.enter("search_actors").await?;
        Ok(json!({ "term": term, "limit": page.limit, "actors": [] }))
    }

    async fn search_feeds(&self, query: &str, page: Page) -> Result<Value, ClientError> {
        self.enter("search_feeds").await?;
        Ok(json!({ "query": query, "limit": page.limit, "feeds": [] }))
    }

    async fn send_images(&self, _post: NewPost, images: Vec<MediaUpload>) -> Result<RecordRef, ClientError> {
        self.enter("send_images").await?;
        assert!(!images.is_empty());
        Ok(self.record("app.bsky.feed.post"))
    }

    async fn send_video(&self, _post: NewPost, _video: MediaUpload) -> Result<RecordRef, ClientError> {
        self.enter("send_video").await?;
        Ok(self.record("app.bsky.feed.post"))
    }
}

/// Connector that hands out one shared [`MockClient`] and counts logins.
#[derive(Debug, Clone)]
pub struct MockConnector {
    pub client: Arc<MockClient>,
    pub logins: Arc<AtomicU32>,
    pub login_delay: Duration,
}

impl MockConnector {
    pub fn new(client: MockClient) -> Self {
        Self { client: Arc::new(client), logins: Arc::new(AtomicU32::new(0)), login_delay: Duration::ZERO }
    }

    pub fn with_login_delay(mut self, delay: Duration) -> Self {
        self.login_delay = delay;
        self
    }

    pub fn logins(&self) -> u32 {
        self.logins.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn login(&self, credentials: &Credentials) -> Result<Arc<dyn SocialClient>, ClientError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if !self.login_delay.is_zero() {
            tokio::time::sleep(self.login_delay).await;
        }
        if credentials.app_password == "wrong" {
            return Err(ClientError::Unauthorized("Invalid identifier or password".into()));
        }
        Ok(self.client.clone())
    }
}
