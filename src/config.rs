//! Server settings loaded from YAML and the process environment.
//!
//! Settings are read once at startup and injected into the components that need them; nothing
//! here is hot-reloaded. Every section has defaults, so a partial file (or no file at all) is a
//! valid configuration.

use crate::auth::{Credentials, DEFAULT_SERVICE_URL};
use crate::media::{MediaProcessor, IMAGE_FORMATS, MAX_IMAGE_SIZE, MAX_VIDEO_SIZE, VIDEO_FORMATS};
use crate::queue::DEFAULT_MAX_CONCURRENT;
use crate::rate_limit::registry::{FOLLOWS, GENERAL, LIKES, MEDIA, POSTS, REPOSTS};
use crate::rate_limit::{CategoryRegistry, LimitSpec, RegistryError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

pub const ENV_IDENTIFIER: &str = "BLUESKY_IDENTIFIER";
pub const ENV_APP_PASSWORD: &str = "BLUESKY_APP_PASSWORD";
pub const ENV_SERVICE_URL: &str = "BLUESKY_SERVICE_URL";

/// Log levels accepted in `logging.level`.
pub const LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid rate limits: {0}")]
    Limits(#[from] RegistryError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub identifier: Option<String>,
    pub app_password: Option<String>,
    pub service_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { identifier: None, app_password: None, service_url: DEFAULT_SERVICE_URL.to_string() }
    }
}

impl AuthConfig {
    pub fn has_credentials(&self) -> bool {
        matches!((&self.identifier, &self.app_password), (Some(id), Some(pw)) if !id.is_empty() && !pw.is_empty())
    }

    /// Credentials for the session cache, when both halves are present.
    pub fn credentials(&self) -> Option<Credentials> {
        if !self.has_credentials() {
            return None;
        }
        let identifier = self.identifier.clone()?;
        let app_password = self.app_password.clone()?;
        Some(Credentials::new(identifier, app_password).with_service_url(self.service_url.clone()))
    }
}

/// Requests per minute for each category and for the global ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub posts_per_minute: u32,
    pub follows_per_minute: u32,
    pub likes_per_minute: u32,
    pub reposts_per_minute: u32,
    pub general_per_minute: u32,
    pub media_per_minute: u32,
    pub global_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            posts_per_minute: 30,
            follows_per_minute: 60,
            likes_per_minute: 100,
            reposts_per_minute: 60,
            general_per_minute: 120,
            media_per_minute: 20,
            global_per_minute: 300,
        }
    }
}

impl RateLimitConfig {
    /// Build the category registry, one 60-second window per category.
    pub fn registry(&self) -> Result<CategoryRegistry, RegistryError> {
        CategoryRegistry::builder()
            .category(POSTS, LimitSpec::per_minute(self.posts_per_minute))
            .category(FOLLOWS, LimitSpec::per_minute(self.follows_per_minute))
            .category(LIKES, LimitSpec::per_minute(self.likes_per_minute))
            .category(REPOSTS, LimitSpec::per_minute(self.reposts_per_minute))
            .category(GENERAL, LimitSpec::per_minute(self.general_per_minute))
            .category(MEDIA, LimitSpec::per_minute(self.media_per_minute))
            .global(LimitSpec::per_minute(self.global_per_minute))
            .build()
    }

    fn per_category(&self) -> [(&'static str, u32); 6] {
        [
            ("Posts", self.posts_per_minute),
            ("Follows", self.follows_per_minute),
            ("Likes", self.likes_per_minute),
            ("Reposts", self.reposts_per_minute),
            ("General", self.general_per_minute),
            ("Media", self.media_per_minute),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub max_image_size: usize,
    pub max_video_size: usize,
    pub allowed_image_formats: Vec<String>,
    pub allowed_video_formats: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_image_size: MAX_IMAGE_SIZE,
            max_video_size: MAX_VIDEO_SIZE,
            allowed_image_formats: IMAGE_FORMATS.iter().map(|s| s.to_string()).collect(),
            allowed_video_formats: VIDEO_FORMATS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl MediaConfig {
    pub fn processor(&self) -> MediaProcessor {
        MediaProcessor::new(self.max_image_size, self.max_video_size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of [`LOG_LEVELS`], case-insensitive.
    pub level: String,
    /// Extra `EnvFilter` directives appended after the level, e.g. `skyguard::retry=debug`.
    pub directives: Option<String>,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "INFO".to_string(), directives: None, ansi: false }
    }
}

impl LoggingConfig {
    pub fn is_valid_level(&self) -> bool {
        LOG_LEVELS.contains(&self.level.to_uppercase().as_str())
    }

    /// The level as a tracing filter directive. `WARNING` maps to `warn`, `CRITICAL` to `error`.
    pub fn filter_directive(&self) -> String {
        let level = match self.level.to_uppercase().as_str() {
            "DEBUG" => "debug",
            "WARNING" | "WARN" => "warn",
            "ERROR" | "CRITICAL" => "error",
            "TRACE" => "trace",
            _ => "info",
        };
        match &self.directives {
            Some(extra) if !extra.trim().is_empty() => format!("{level},{}", extra.trim()),
            _ => level.to_string(),
        }
    }
}

/// Outcome of [`Settings::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigReport {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub has_credentials: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub authentication: AuthConfig,
    pub rate_limits: RateLimitConfig,
    pub media: MediaConfig,
    pub logging: LoggingConfig,
    pub max_concurrent: usize,
    pub debug: bool,
    pub test_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            authentication: AuthConfig::default(),
            rate_limits: RateLimitConfig::default(),
            media: MediaConfig::default(),
            logging: LoggingConfig::default(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            debug: false,
            test_mode: false,
        }
    }
}

impl Settings {
    /// Load a YAML file. Environment variables are not consulted; see [`Settings::load`].
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
            _ => ConfigError::Io { path: path.to_path_buf(), source },
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Defaults plus credentials from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults plus credentials from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        settings.apply_lookup(lookup);
        settings
    }

    /// YAML file with missing credentials filled from the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut settings = Self::from_yaml(path)?;
        settings.apply_env();
        Ok(settings)
    }

    pub fn apply_env(&mut self) {
        self.apply_lookup(|key| std::env::var(key).ok());
    }

    /// Fill unset credentials from `lookup`. The service URL is only taken from the lookup
    /// while it still holds the default.
    pub fn apply_lookup<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let auth = &mut self.authentication;
        if auth.identifier.is_none() {
            auth.identifier = lookup(ENV_IDENTIFIER).filter(|v| !v.is_empty());
        }
        if auth.app_password.is_none() {
            auth.app_password = lookup(ENV_APP_PASSWORD).filter(|v| !v.is_empty());
        }
        if auth.service_url == DEFAULT_SERVICE_URL {
            if let Some(url) = lookup(ENV_SERVICE_URL).filter(|v| !v.is_empty()) {
                auth.service_url = url;
            }
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.authentication.credentials()
    }

    pub fn validate(&self) -> ConfigReport {
        let mut issues = Vec::new();
        let auth = &self.authentication;

        if auth.identifier.as_deref().map_or(true, str::is_empty) {
            issues.push(format!("Missing {ENV_IDENTIFIER}"));
        }
        if auth.app_password.as_deref().map_or(true, str::is_empty) {
            issues.push(format!("Missing {ENV_APP_PASSWORD}"));
        }
        if !(auth.service_url.starts_with("http://") || auth.service_url.starts_with("https://")) {
            issues.push("Invalid service URL format".to_string());
        }

        for (name, limit) in self.rate_limits.per_category() {
            if limit == 0 {
                issues.push(format!("{name} per minute must be positive"));
            }
        }
        if self.rate_limits.global_per_minute == 0 {
            issues.push("Global rate limit must be positive".to_string());
        }
        if self.max_concurrent == 0 {
            issues.push("Max concurrent requests must be positive".to_string());
        }

        if self.media.max_image_size == 0 {
            issues.push("Max image size must be positive".to_string());
        }
        if self.media.max_video_size == 0 {
            issues.push("Max video size must be positive".to_string());
        }

        if !self.logging.is_valid_level() {
            issues.push(format!("Invalid log level. Must be one of: {LOG_LEVELS:?}"));
        }

        ConfigReport { is_valid: issues.is_empty(), issues, has_credentials: auth.has_credentials() }
    }

    /// JSON view with the app password replaced by `has_password`.
    pub fn summary(&self) -> Value {
        let auth = &self.authentication;
        json!({
            "authentication": {
                "identifier": auth.identifier,
                "has_password": auth.app_password.as_deref().is_some_and(|pw| !pw.is_empty()),
                "service_url": auth.service_url,
            },
            "rate_limits": self.rate_limits,
            "media": self.media,
            "logging": self.logging,
            "max_concurrent": self.max_concurrent,
            "debug": self.debug,
            "test_mode": self.test_mode,
        })
    }

    pub fn example_yaml() -> &'static str {
        EXAMPLE_YAML
    }
}

const EXAMPLE_YAML: &str = r#"# Bluesky MCP server configuration
authentication:
  # Prefer BLUESKY_IDENTIFIER / BLUESKY_APP_PASSWORD over storing these here.
  identifier: "your-handle.bsky.social"
  app_password: "your-app-password"
  service_url: "https://bsky.social"

rate_limits:
  posts_per_minute: 30
  follows_per_minute: 60
  likes_per_minute: 100
  reposts_per_minute: 60
  general_per_minute: 120
  media_per_minute: 20
  global_per_minute: 300

media:
  max_image_size: 1048576
  max_video_size: 52428800
  allowed_image_formats: [".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"]
  allowed_video_formats: [".mp4", ".mov", ".avi", ".webm"]

logging:
  level: "INFO"
  # directives: "skyguard::retry=debug"
  ansi: false

max_concurrent: 5
debug: false
test_mode: false
"#;
