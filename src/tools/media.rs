//! Posts with attached images or video. Media arrives base64 encoded and is forwarded as-is.

use super::{created, Args, ToolRegistry};
use crate::client::MediaUpload;
use crate::error::ToolError;
use crate::media::{MediaError, MediaKind, MediaProcessor, MAX_IMAGES_PER_POST};
use crate::pipeline::{handler, OperationConfig, ToolRequest};
use crate::rate_limit::registry::MEDIA;
use crate::validation::Rule;
use serde_json::Value;

pub fn register(registry: &mut ToolRegistry) {
    let media = registry.runtime().media;
    registry.register(
        OperationConfig::new("send_image").category(MEDIA).validate("text", Rule::PostContent),
        handler(move |req: ToolRequest| send_image(media, req)),
    );
    registry.register(
        OperationConfig::new("send_images").category(MEDIA).validate("text", Rule::PostContent),
        handler(move |req: ToolRequest| send_images(media, req)),
    );
    registry.register(
        OperationConfig::new("send_video").category(MEDIA).validate("text", Rule::PostContent),
        handler(move |req: ToolRequest| send_video(media, req)),
    );
}

async fn send_image(media: MediaProcessor, req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let args = Args(&req.args);
    let bytes = media.decode(&args.str("image_data")?, MediaKind::Image)?;
    let upload = MediaUpload { bytes, alt: args.opt_str("image_alt")?.unwrap_or_default() };
    let record = client.send_images(args.new_post()?, vec![upload]).await?;
    Ok(created("Post with image created successfully", "post", record))
}

async fn send_images(media: MediaProcessor, req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let args = Args(&req.args);
    let encoded = args.str_list("images_data")?;
    let uploads = image_uploads(&media, &encoded, &args.str_list("image_alts")?)?;
    let record = client.send_images(args.new_post()?, uploads).await?;
    Ok(created("Post with images created successfully", "post", record))
}

async fn send_video(media: MediaProcessor, req: ToolRequest) -> Result<Value, ToolError> {
    let client = req.client()?;
    let args = Args(&req.args);
    let bytes = media.decode(&args.str("video_data")?, MediaKind::Video)?;
    let upload = MediaUpload { bytes, alt: args.opt_str("video_alt")?.unwrap_or_default() };
    let record = client.send_video(args.new_post()?, upload).await?;
    Ok(created("Post with video created successfully", "post", record))
}

/// Decode 1 to [`MAX_IMAGES_PER_POST`] images, pairing each with its alt text when given.
pub fn image_uploads(
    media: &MediaProcessor,
    encoded: &[String],
    alts: &[String],
) -> Result<Vec<MediaUpload>, MediaError> {
    if encoded.is_empty() {
        return Err(MediaError::NoImages);
    }
    if encoded.len() > MAX_IMAGES_PER_POST {
        return Err(MediaError::TooManyImages);
    }
    encoded
        .iter()
        .enumerate()
        .map(|(i, data)| {
            let bytes = media.decode(data, MediaKind::Image)?;
            Ok(MediaUpload { bytes, alt: alts.get(i).cloned().unwrap_or_default() })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_count_is_bounded() {
        let media = MediaProcessor::default();
        assert_eq!(image_uploads(&media, &[], &[]), Err(MediaError::NoImages));
        let five = vec!["aGk=".to_string(); 5];
        assert_eq!(image_uploads(&media, &five, &[]), Err(MediaError::TooManyImages));
    }

    #[test]
    fn alts_pair_by_position() {
        let media = MediaProcessor::default();
        let uploads =
            image_uploads(&media, &["aGk=".to_string(), "aGk=".to_string()], &["first".to_string()]).unwrap();
        assert_eq!(uploads[0].alt, "first");
        assert_eq!(uploads[1].alt, "");
        assert_eq!(uploads[1].bytes, b"hi");
    }

    #[test]
    fn oversized_image_is_rejected() {
        let media = MediaProcessor::new(1, 10);
        assert!(matches!(
            image_uploads(&media, &["aGk=".to_string()], &[]),
            Err(MediaError::TooLarge { kind: MediaKind::Image, .. })
        ));
    }
}
