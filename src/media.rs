//! Media decoding and checks. Bytes are passed through unmodified; there is no transcoding.

use crate::validation::decode_base64;
use serde::Serialize;
use std::path::Path;

/// Bluesky's image size limit (1 MiB).
pub const MAX_IMAGE_SIZE: usize = 1024 * 1024;
/// Bluesky's video size limit (50 MiB).
pub const MAX_VIDEO_SIZE: usize = 50 * 1024 * 1024;
pub const IMAGE_FORMATS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"];
pub const VIDEO_FORMATS: &[&str] = &[".mp4", ".mov", ".avi", ".webm"];
/// Images allowed on a single post.
pub const MAX_IMAGES_PER_POST: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("Failed to decode media data: {0}")]
    Decode(String),
    #[error("{kind} size {size} bytes exceeds limit of {max} bytes")]
    TooLarge { kind: MediaKind, size: usize, max: usize },
    #[error("Format {0} not allowed")]
    UnsupportedFormat(String),
    #[error("At least one image is required")]
    NoImages,
    #[error("Maximum of 4 images allowed")]
    TooManyImages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Image => f.write_str("Image"),
            MediaKind::Video => f.write_str("Video"),
        }
    }
}

/// What is known about an upload without decoding its contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaInfo {
    pub filename: String,
    pub mime_type: String,
    pub size: usize,
}

impl MediaInfo {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }

    /// Fallback alt text when the caller supplies none.
    pub fn alt_text_placeholder(&self) -> String {
        if self.is_image() {
            format!("Image: {}", self.filename)
        } else if self.is_video() {
            format!("Video: {}", self.filename)
        } else {
            format!("Media: {}", self.filename)
        }
    }
}

/// Size limits for uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaProcessor {
    pub max_image_size: usize,
    pub max_video_size: usize,
}

impl Default for MediaProcessor {
    fn default() -> Self {
        Self { max_image_size: MAX_IMAGE_SIZE, max_video_size: MAX_VIDEO_SIZE }
    }
}

impl MediaProcessor {
    pub fn new(max_image_size: usize, max_video_size: usize) -> Self {
        Self { max_image_size, max_video_size }
    }

    /// Decode base64 and check it against the limit for `kind`.
    pub fn decode(&self, encoded: &str, kind: MediaKind) -> Result<Vec<u8>, MediaError> {
        let bytes = decode_base64(encoded).map_err(|e| MediaError::Decode(e.to_string()))?;
        self.check_size(kind, bytes.len())?;
        Ok(bytes)
    }

    pub fn check_size(&self, kind: MediaKind, size: usize) -> Result<(), MediaError> {
        let max = match kind {
            MediaKind::Image => self.max_image_size,
            MediaKind::Video => self.max_video_size,
        };
        if size > max {
            return Err(MediaError::TooLarge { kind, size, max });
        }
        Ok(())
    }

    /// Classify `filename` by extension and check `data` against that kind's limit.
    pub fn validate(&self, filename: &str, data: &[u8]) -> Result<MediaKind, MediaError> {
        let kind = media_kind(filename).ok_or_else(|| MediaError::UnsupportedFormat(extension(filename)))?;
        self.check_size(kind, data.len())?;
        Ok(kind)
    }

    pub fn info(&self, filename: &str, data: &[u8]) -> MediaInfo {
        MediaInfo { filename: filename.to_string(), mime_type: mime_type(filename).to_string(), size: data.len() }
    }
}

pub fn media_kind(filename: &str) -> Option<MediaKind> {
    let ext = extension(filename);
    if IMAGE_FORMATS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_FORMATS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

pub fn is_supported_media_type(filename: &str) -> bool {
    media_kind(filename).is_some()
}

pub fn mime_type(filename: &str) -> &'static str {
    match extension(filename).as_str() {
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        ".bmp" => "image/bmp",
        ".mp4" => "video/mp4",
        ".mov" => "video/quicktime",
        ".avi" => "video/x-msvideo",
        ".webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

fn extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}
