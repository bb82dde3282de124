//! Media type detection for uploads.
//!
//! Magic bytes decide first, then the declared content type, then the file
//! extension. Anything that is not an image or a video is rejected.

use thiserror::Error;

use crate::types::MediaType;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("Unsupported media type: {0}")]
    Unsupported(String),

    #[error("Empty upload")]
    Empty,

    #[error("Invalid media URL: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedMedia {
    pub media_type: MediaType,
    pub mime_type: String,
    pub extension: &'static str,
}

impl DetectedMedia {
    fn new(media_type: MediaType, mime_type: &str, extension: &'static str) -> Self {
        Self {
            media_type,
            mime_type: mime_type.to_string(),
            extension,
        }
    }
}

const KNOWN_TYPES: &[(&str, &str, MediaType)] = &[
    ("png", "image/png", MediaType::Image),
    ("jpg", "image/jpeg", MediaType::Image),
    ("jpeg", "image/jpeg", MediaType::Image),
    ("gif", "image/gif", MediaType::Image),
    ("webp", "image/webp", MediaType::Image),
    ("bmp", "image/bmp", MediaType::Image),
    ("mp4", "video/mp4", MediaType::Video),
    ("m4v", "video/mp4", MediaType::Video),
    ("mov", "video/quicktime", MediaType::Video),
    ("webm", "video/webm", MediaType::Video),
    ("mkv", "video/x-matroska", MediaType::Video),
    ("avi", "video/x-msvideo", MediaType::Video),
];

pub fn detect_media(
    bytes: &[u8],
    declared_content_type: Option<&str>,
    file_name: Option<&str>,
) -> Result<DetectedMedia, MediaError> {
    if bytes.is_empty() {
        return Err(MediaError::Empty);
    }

    if let Some(detected) = sniff(bytes) {
        return Ok(detected);
    }

    if let Some(detected) = declared_content_type.and_then(from_content_type) {
        return Ok(detected);
    }

    if let Some(detected) = file_name.and_then(from_extension) {
        return Ok(detected);
    }

    let described = declared_content_type
        .map(str::to_string)
        .or_else(|| file_name.map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());
    Err(MediaError::Unsupported(described))
}

fn sniff(bytes: &[u8]) -> Option<DetectedMedia> {
    use MediaType::{Image, Video};

    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some(DetectedMedia::new(Image, "image/png", "png"));
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(DetectedMedia::new(Image, "image/jpeg", "jpg"));
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some(DetectedMedia::new(Image, "image/gif", "gif"));
    }
    if bytes.starts_with(b"BM") && bytes.len() > 14 {
        return Some(DetectedMedia::new(Image, "image/bmp", "bmp"));
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" {
        match &bytes[8..12] {
            b"WEBP" => return Some(DetectedMedia::new(Image, "image/webp", "webp")),
            b"AVI " => return Some(DetectedMedia::new(Video, "video/x-msvideo", "avi")),
            _ => {}
        }
    }
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        let brand = &bytes[8..12];
        if brand == b"qt  " {
            return Some(DetectedMedia::new(Video, "video/quicktime", "mov"));
        }
        // HEIF/AVIF stills share the ftyp box
        if brand == b"avif" || brand == b"heic" {
            return None;
        }
        return Some(DetectedMedia::new(Video, "video/mp4", "mp4"));
    }
    if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        let head = &bytes[..bytes.len().min(64)];
        if head.windows(4).any(|w| w == b"webm") {
            return Some(DetectedMedia::new(Video, "video/webm", "webm"));
        }
        return Some(DetectedMedia::new(Video, "video/x-matroska", "mkv"));
    }

    None
}

fn from_content_type(content_type: &str) -> Option<DetectedMedia> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    KNOWN_TYPES
        .iter()
        .find(|(_, mime, _)| *mime == essence)
        .map(|(ext, mime, kind)| DetectedMedia::new(*kind, mime, *ext))
}

fn from_extension(file_name: &str) -> Option<DetectedMedia> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    KNOWN_TYPES
        .iter()
        .find(|(known, _, _)| *known == ext)
        .map(|(ext, mime, kind)| DetectedMedia::new(*kind, mime, *ext))
}

/// Linked media must point at an http(s) URL
pub fn validate_media_url(raw: &str) -> Result<url::Url, MediaError> {
    let parsed = url::Url::parse(raw.trim()).map_err(|_| MediaError::InvalidUrl(raw.to_string()))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host().is_some() => Ok(parsed),
        _ => Err(MediaError::InvalidUrl(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_common_images() {
        let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
        let detected = detect_media(png, Some("application/octet-stream"), Some("x.bin")).unwrap();
        assert_eq!(detected.media_type, MediaType::Image);
        assert_eq!(detected.mime_type, "image/png");

        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        assert_eq!(detect_media(&jpeg, None, None).unwrap().extension, "jpg");

        let webp = b"RIFF\x24\0\0\0WEBPVP8 ";
        assert_eq!(detect_media(webp, None, None).unwrap().mime_type, "image/webp");
    }

    #[test]
    fn sniffs_common_videos() {
        let mp4 = b"\0\0\0\x18ftypmp42\0\0\0\0";
        let detected = detect_media(mp4, Some("image/png"), None).unwrap();
        assert_eq!(detected.media_type, MediaType::Video);
        assert_eq!(detected.mime_type, "video/mp4");

        let mov = b"\0\0\0\x14ftypqt  \0\0\0\0";
        assert_eq!(detect_media(mov, None, None).unwrap().extension, "mov");

        let webm = [0x1A, 0x45, 0xDF, 0xA3, 0x9F, 0x42, 0x82, 0x84, b'w', b'e', b'b', b'm'];
        assert_eq!(detect_media(&webm, None, None).unwrap().mime_type, "video/webm");
    }

    #[test]
    fn falls_back_to_content_type_then_extension() {
        let unknown = b"not really a header";
        let by_type = detect_media(unknown, Some("video/webm; codecs=vp9"), Some("clip.png")).unwrap();
        assert_eq!(by_type.media_type, MediaType::Video);

        let by_ext = detect_media(unknown, None, Some("Screenshot.JPEG")).unwrap();
        assert_eq!(by_ext.mime_type, "image/jpeg");
    }

    #[test]
    fn svg_is_not_accepted() {
        // scriptable, and uploads are served from the API origin
        let svg = b"<svg xmlns=\"http://www.w3.org/2000/svg\"><script>alert(1)</script></svg>";
        assert_eq!(
            detect_media(svg, Some("image/svg+xml"), Some("logo.svg")),
            Err(MediaError::Unsupported("image/svg+xml".to_string()))
        );
        assert!(detect_media(svg, None, Some("logo.svg")).is_err());
    }

    #[test]
    fn rejects_other_files() {
        assert_eq!(
            detect_media(b"%PDF-1.7", Some("application/pdf"), Some("deck.pdf")),
            Err(MediaError::Unsupported("application/pdf".to_string()))
        );
        assert_eq!(detect_media(b"", Some("image/png"), None), Err(MediaError::Empty));
        assert!(detect_media(b"\0\0\0\x18ftypavif", None, Some("a.avif")).is_err());
    }

    #[test]
    fn media_urls_must_be_http() {
        assert!(validate_media_url("https://videos.example.com/watch?v=1").is_ok());
        assert!(validate_media_url("ftp://example.com/a.mp4").is_err());
        assert!(validate_media_url("javascript:alert(1)").is_err());
        assert!(validate_media_url("not a url").is_err());
    }
}
