//! Named input rules applied by the pipeline's validation stage.
//!
//! A rule may normalise its argument (trimmed post text, handle without `@`, clamped limit);
//! the stage writes the normalised value back before the call proceeds.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Maximum post length, in characters.
pub const MAX_POST_LENGTH: usize = 300;
/// Default maximum upload size (1 MiB).
pub const MAX_FILE_SIZE: usize = 1024 * 1024;
/// Bounds for list `limit` parameters.
pub const LIMIT_RANGE: (i64, i64) = (1, 100);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Text exceeds {max} character limit")]
    TextTooLong { max: usize },
    #[error("File size exceeds {max} bytes")]
    FileTooLarge { max: usize },
    #[error("{0} cannot be empty")]
    Empty(&'static str),
    #[error("Invalid handle format")]
    HandleFormat,
    #[error("URI must start with 'at://'")]
    UriScheme,
    #[error("expected {0}")]
    WrongType(&'static str),
    #[error("Invalid base64 data: {0}")]
    Base64(String),
}

/// A named validation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    PostContent,
    UserHandle,
    AtUri,
    Limit,
    MediaData,
}

impl Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Rule::PostContent => "post_content",
            Rule::UserHandle => "user_handle",
            Rule::AtUri => "at_uri",
            Rule::Limit => "limit",
            Rule::MediaData => "media_data",
        }
    }

    /// Check `value` and return its normalised form.
    pub fn apply(&self, validator: &InputValidator, value: &Value) -> Result<Value, ValidationError> {
        match self {
            Rule::PostContent => validator.validate_post_content(&text_of(value)?).map(Value::from),
            Rule::UserHandle => validator.validate_user_handle(&text_of(value)?).map(Value::from),
            Rule::AtUri => validate_uri(&text_of(value)?).map(Value::from),
            Rule::Limit => validate_limit(value).map(Value::from),
            Rule::MediaData => {
                let encoded = text_of(value)?;
                validator.validate_media_data(&encoded)?;
                Ok(Value::from(encoded))
            }
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown validation rule '{0}'")]
pub struct UnknownRule(pub String);

impl FromStr for Rule {
    type Err = UnknownRule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post_content" => Ok(Rule::PostContent),
            "user_handle" => Ok(Rule::UserHandle),
            "at_uri" => Ok(Rule::AtUri),
            "limit" => Ok(Rule::Limit),
            "media_data" => Ok(Rule::MediaData),
            other => Err(UnknownRule(other.to_string())),
        }
    }
}

/// Limits the rules check against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputValidator {
    pub max_post_length: usize,
    pub max_file_size: usize,
}

impl Default for InputValidator {
    fn default() -> Self {
        Self { max_post_length: MAX_POST_LENGTH, max_file_size: MAX_FILE_SIZE }
    }
}

impl InputValidator {
    pub fn validate_post_content(&self, content: &str) -> Result<String, ValidationError> {
        let content = sanitize_input(content);
        validate_text_length(&content, self.max_post_length)?;
        Ok(content)
    }

    pub fn validate_user_handle(&self, handle: &str) -> Result<String, ValidationError> {
        validate_handle(handle)
    }

    /// Decode base64 media and check the size limit.
    pub fn validate_media_data(&self, encoded: &str) -> Result<Vec<u8>, ValidationError> {
        let bytes = decode_base64(encoded)?;
        validate_file_size(&bytes, self.max_file_size)?;
        Ok(bytes)
    }
}

/// Drop NUL bytes, normalise line endings to `\n`, and trim surrounding whitespace.
pub fn sanitize_input(text: &str) -> String {
    text.replace('\0', "").replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

pub fn validate_text_length(text: &str, max: usize) -> Result<(), ValidationError> {
    if text.chars().count() > max {
        return Err(ValidationError::TextTooLong { max });
    }
    Ok(())
}

pub fn validate_file_size(data: &[u8], max: usize) -> Result<(), ValidationError> {
    if data.len() > max {
        return Err(ValidationError::FileTooLarge { max });
    }
    Ok(())
}

/// Strip a leading `@` and check the handle alphabet.
pub fn validate_handle(handle: &str) -> Result<String, ValidationError> {
    if handle.is_empty() {
        return Err(ValidationError::Empty("Handle"));
    }
    let handle = handle.strip_prefix('@').unwrap_or(handle);
    if !handle_pattern().is_match(handle) {
        return Err(ValidationError::HandleFormat);
    }
    Ok(handle.to_string())
}

pub fn validate_uri(uri: &str) -> Result<String, ValidationError> {
    if uri.is_empty() {
        return Err(ValidationError::Empty("URI"));
    }
    if !uri.starts_with("at://") {
        return Err(ValidationError::UriScheme);
    }
    Ok(uri.to_string())
}

/// Accept an integer or a numeric string and clamp it into [`LIMIT_RANGE`].
pub fn validate_limit(value: &Value) -> Result<i64, ValidationError> {
    let raw = match value {
        Value::Number(n) => n.as_i64().ok_or(ValidationError::WrongType("an integer"))?,
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| ValidationError::WrongType("an integer"))?,
        _ => return Err(ValidationError::WrongType("an integer")),
    };
    Ok(raw.clamp(LIMIT_RANGE.0, LIMIT_RANGE.1))
}

pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, ValidationError> {
    STANDARD.decode(encoded.trim()).map_err(|e| ValidationError::Base64(e.to_string()))
}

fn text_of(value: &Value) -> Result<String, ValidationError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(ValidationError::WrongType("a string")),
    }
}

fn handle_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9.\-_]+$").expect("handle pattern compiles"))
}
