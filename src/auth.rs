//! Authenticated capability resolution.
//!
//! The pipeline never builds a client itself. Its authentication stage asks an
//! [`AuthProvider`] for one; [`SessionCache`] logs in lazily on first demand and reuses the
//! session afterwards.

use crate::client::{ClientError, SocialClient};
use crate::error::ToolError;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Message used when no credentials are configured.
pub const AUTH_UNAVAILABLE: &str = "authentication required but not available";

/// Default Bluesky PDS entry point.
pub const DEFAULT_SERVICE_URL: &str = "https://bsky.social";

/// Account identifier, app password, and service URL.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub identifier: String,
    pub app_password: String,
    pub service_url: String,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, app_password: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            app_password: app_password.into(),
            service_url: DEFAULT_SERVICE_URL.to_string(),
        }
    }

    pub fn with_service_url(mut self, url: impl Into<String>) -> Self {
        self.service_url = url.into();
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("app_password", &"<redacted>")
            .field("service_url", &self.service_url)
            .finish()
    }
}

/// Opens a session for a set of credentials.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<Arc<dyn SocialClient>, ClientError>;
}

/// Source of the authenticated capability.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Return a session, logging in if needed.
    async fn resolve(&self) -> Result<Arc<dyn SocialClient>, ToolError>;

    /// The current session, if one exists, without logging in.
    fn current(&self) -> Option<Arc<dyn SocialClient>>;
}

struct Session {
    client: Arc<dyn SocialClient>,
}

/// Lazily authenticated session shared by every tool.
///
/// Reads are lock-free. Concurrent first callers serialise on a login mutex so only one login
/// is attempted; the rest pick up the stored session.
pub struct SessionCache {
    credentials: Option<Credentials>,
    connector: Arc<dyn Connector>,
    session: ArcSwapOption<Session>,
    login: tokio::sync::Mutex<()>,
}

impl SessionCache {
    pub fn new<C>(credentials: Option<Credentials>, connector: C) -> Self
    where
        C: Connector + 'static,
    {
        Self {
            credentials,
            connector: Arc::new(connector),
            session: ArcSwapOption::empty(),
            login: tokio::sync::Mutex::new(()),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.load().is_some()
    }

    /// Drop the stored session; the next `resolve` logs in again.
    pub fn invalidate(&self) {
        if self.session.swap(None).is_some() {
            info!(target: "skyguard::auth", "session invalidated");
        }
    }
}

#[async_trait]
impl AuthProvider for SessionCache {
    async fn resolve(&self) -> Result<Arc<dyn SocialClient>, ToolError> {
        if let Some(client) = self.current() {
            return Ok(client);
        }
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| ToolError::Authentication(AUTH_UNAVAILABLE.to_string()))?;

        let _guard = self.login.lock().await;
        if let Some(client) = self.current() {
            return Ok(client);
        }

        info!(
            target: "skyguard::auth",
            identifier = %credentials.identifier,
            service_url = %credentials.service_url,
            "logging in"
        );
        let client = self.connector.login(credentials).await.map_err(|e| {
            warn!(target: "skyguard::auth", error = %e, "login failed");
            ToolError::Authentication(format!("Authentication error: {e}"))
        })?;
        self.session.store(Some(Arc::new(Session { client: client.clone() })));
        Ok(client)
    }

    fn current(&self) -> Option<Arc<dyn SocialClient>> {
        self.session.load_full().map(|session| session.client.clone())
    }
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache")
            .field("credentials", &self.credentials)
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

/// Provider wrapping an already authenticated client.
#[derive(Clone)]
pub struct StaticSession(pub Arc<dyn SocialClient>);

#[async_trait]
impl AuthProvider for StaticSession {
    async fn resolve(&self) -> Result<Arc<dyn SocialClient>, ToolError> {
        Ok(self.0.clone())
    }

    fn current(&self) -> Option<Arc<dyn SocialClient>> {
        Some(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Refusing(Arc<AtomicU32>);

    #[async_trait]
    impl Connector for Refusing {
        async fn login(&self, _credentials: &Credentials) -> Result<Arc<dyn SocialClient>, ClientError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::Unauthorized("bad app password".into()))
        }
    }

    #[tokio::test]
    async fn missing_credentials_never_call_connector() {
        let attempts = Arc::new(AtomicU32::new(0));
        let cache = SessionCache::new(None, Refusing(attempts.clone()));
        let err = cache.resolve().await.err().unwrap();
        assert_eq!(err, ToolError::Authentication(AUTH_UNAVAILABLE.into()));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
        assert!(!cache.has_credentials());
    }

    #[tokio::test]
    async fn login_failure_is_an_authentication_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let cache = SessionCache::new(Some(Credentials::new("alice.test", "pw")), Refusing(attempts.clone()));
        let err = cache.resolve().await.err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::Authentication);
        assert!(err.to_string().contains("bad app password"));
        assert!(!cache.is_authenticated());
        // failures are not cached
        let _ = cache.resolve().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn debug_redacts_password() {
        let rendered = format!("{:?}", Credentials::new("alice.test", "hunter2"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("https://bsky.social"));
    }
}
