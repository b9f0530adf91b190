//! Media kind detection, upload validation, and thumbnail generation.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AppError, AppResult};

pub const LICENSES: &[&str] = &["CC_ZERO_1_0", "CC_BY_4_0", "CC_BY_SA_4_0"];

const ALLOWED_PICTURE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];
const ALLOWED_VIDEO_TYPES: &[&str] = &["video/mp4", "video/webm", "video/x-matroska"];
const ALLOWED_AUDIO_TYPES: &[&str] = &["audio/mpeg", "audio/ogg", "audio/x-wav", "audio/x-flac"];
const ALLOWED_DOCUMENT_TYPES: &[&str] = &["application/pdf"];

const THUMBNAIL_MAX_DIM: u32 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Picture,
    Video,
    Audio,
    Document,
}

impl FileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Picture => "picture",
            FileKind::Video => "video",
            FileKind::Audio => "audio",
            FileKind::Document => "document",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "picture" => Some(FileKind::Picture),
            "video" => Some(FileKind::Video),
            "audio" => Some(FileKind::Audio),
            "document" => Some(FileKind::Document),
            _ => None,
        }
    }

    /// Placeholder thumbnail used until (or unless) a real one exists.
    pub fn default_thumbnail_url(self) -> String {
        format!("/static/images/file-{}.svg", self.as_str())
    }

    fn allowed_mime_types(self) -> &'static [&'static str] {
        match self {
            FileKind::Picture => ALLOWED_PICTURE_TYPES,
            FileKind::Video => ALLOWED_VIDEO_TYPES,
            FileKind::Audio => ALLOWED_AUDIO_TYPES,
            FileKind::Document => ALLOWED_DOCUMENT_TYPES,
        }
    }

    /// The kind whose allow-list contains the MIME type, if any.
    pub fn for_mime_type(mime_type: &str) -> Option<Self> {
        for kind in [
            FileKind::Picture,
            FileKind::Video,
            FileKind::Audio,
            FileKind::Document,
        ] {
            if kind.allowed_mime_types().contains(&mime_type) {
                return Some(kind);
            }
        }
        None
    }
}

/// Sniff the MIME type from content, never trusting the client header, and
/// classify it. Unknown or disallowed content is rejected.
pub fn sniff_kind(bytes: &[u8]) -> AppResult<(FileKind, &'static str)> {
    let detected = infer::get(bytes)
        .ok_or_else(|| AppError::validation("could not determine file type from content"))?;
    let mime_type = detected.mime_type();
    let kind = FileKind::for_mime_type(mime_type).ok_or_else(|| {
        AppError::validation(format!("unsupported media type: {mime_type}"))
    })?;
    Ok((kind, mime_type))
}

pub fn validate_license(license: &str) -> AppResult<()> {
    if LICENSES.contains(&license) {
        return Ok(());
    }
    Err(AppError::validation(format!("unknown license: {license}")))
}

/// Client-supplied thumbnail URLs must point at our own static or media
/// paths, nothing external.
pub fn validate_thumbnail_url(url: &str) -> AppResult<()> {
    if url.starts_with("/static/images/") || url.starts_with("/media/") {
        return Ok(());
    }
    Err(AppError::validation(
        "thumbnail_url must start with /static/images/ or /media/",
    ))
}

pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Downscale a picture to a JPEG thumbnail. Alpha is flattened since JPEG
/// has no transparency.
pub fn render_thumbnail(bytes: &[u8]) -> AppResult<Vec<u8>> {
    let img = image::load_from_memory(bytes)
        .map_err(|err| AppError::validation(format!("unreadable image: {err}")))?;
    let thumb = img.thumbnail(THUMBNAIL_MAX_DIM, THUMBNAIL_MAX_DIM);
    let rgb = DynamicImage::ImageRgb8(thumb.to_rgb8());

    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageFormat::Jpeg)
        .map_err(|err| AppError::internal(format!("thumbnail encoding failed: {err}")))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(2, 2));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn sniffs_png_as_picture() {
        let (kind, mime) = sniff_kind(&png_bytes()).unwrap();
        assert_eq!(kind, FileKind::Picture);
        assert_eq!(mime, "image/png");
    }

    #[test]
    fn rejects_unknown_content() {
        let err = sniff_kind(b"just some text, not media").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ValidationError);
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [
            FileKind::Picture,
            FileKind::Video,
            FileKind::Audio,
            FileKind::Document,
        ] {
            assert_eq!(FileKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn thumbnail_url_validation() {
        assert!(validate_thumbnail_url("/static/images/file-audio.svg").is_ok());
        assert!(validate_thumbnail_url("/media/thumbnails/abc.jpg").is_ok());
        assert!(validate_thumbnail_url("https://evil.example/x.png").is_err());
    }

    #[test]
    fn renders_jpeg_thumbnail() {
        let thumb = render_thumbnail(&png_bytes()).unwrap();
        assert_eq!(&thumb[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn license_validation() {
        assert!(validate_license("CC_BY_4_0").is_ok());
        assert!(validate_license("GPL_3_0").is_err());
    }
}
