use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use url::Url;

pub mod twitter;
pub mod youtube;

use crate::{DigestError, Result};

static TWITTER_DOMAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:(?:fx|vx)?twitter|(?:fixup|fixv)?x)\.com\b").expect("valid regex"));

static TWEET_STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"status/(\d+)").expect("valid regex"));

/// Where a video comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[serde(rename = "youtube")]
    YouTube,
    Twitter,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::YouTube => "youtube",
            SourceKind::Twitter => "twitter",
        }
    }

    pub fn platform_name(&self) -> &'static str {
        match self {
            SourceKind::YouTube => "YouTube",
            SourceKind::Twitter => "Twitter/X",
        }
    }
}

/// A resolved, provider-specific video reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoReference {
    YouTube { video_id: String },
    Twitter { tweet_url: String, tweet_id: String },
}

impl VideoReference {
    pub fn source_kind(&self) -> SourceKind {
        match self {
            VideoReference::YouTube { .. } => SourceKind::YouTube,
            VideoReference::Twitter { .. } => SourceKind::Twitter,
        }
    }

    /// Identifier used to name persisted artifacts
    pub fn id(&self) -> &str {
        match self {
            VideoReference::YouTube { video_id } => video_id,
            VideoReference::Twitter { tweet_id, .. } => tweet_id,
        }
    }

    /// Public page of the video
    pub fn source_url(&self) -> String {
        match self {
            VideoReference::YouTube { video_id } => {
                format!("https://www.youtube.com/watch?v={}", urlencoding::encode(video_id))
            }
            VideoReference::Twitter { tweet_url, .. } => tweet_url.clone(),
        }
    }
}

/// Display metadata confirmed by the metadata lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub author_name: String,
}

/// Content handed to the summarizer
#[derive(Clone, PartialEq, Eq)]
pub enum ExtractedContent {
    Transcript(String),
    VideoBytes {
        bytes: Vec<u8>,
        mime_type: &'static str,
        caption: String,
    },
}

impl ExtractedContent {
    /// Text returned to the caller alongside the summary
    pub fn text(&self) -> &str {
        match self {
            ExtractedContent::Transcript(text) => text,
            ExtractedContent::VideoBytes { caption, .. } => caption,
        }
    }
}

impl std::fmt::Debug for ExtractedContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractedContent::Transcript(text) => f
                .debug_struct("Transcript")
                .field("chars", &text.chars().count())
                .finish(),
            ExtractedContent::VideoBytes {
                bytes, mime_type, ..
            } => f
                .debug_struct("VideoBytes")
                .field("len", &bytes.len())
                .field("mime_type", mime_type)
                .finish(),
        }
    }
}

/// Classify user input as a Twitter/X post or a YouTube video
pub fn resolve_reference(input: &str) -> Result<VideoReference> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DigestError::UnrecognizedUrl(
            "empty video reference".to_string(),
        ));
    }

    if TWITTER_DOMAIN.is_match(input) {
        let tweet_id = TWEET_STATUS
            .captures(input)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| DigestError::UnrecognizedUrl(input.to_string()))?;

        return Ok(VideoReference::Twitter {
            tweet_url: input.to_string(),
            tweet_id,
        });
    }

    let video_id = Url::parse(input)
        .ok()
        .and_then(|url| youtube::video_id_from_url(&url))
        .unwrap_or_else(|| input.to_string());

    Ok(VideoReference::YouTube { video_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tweet_id(input: &str) -> Option<String> {
        match resolve_reference(input) {
            Ok(VideoReference::Twitter { tweet_id, .. }) => Some(tweet_id),
            _ => None,
        }
    }

    #[test]
    fn test_twitter_status_urls() {
        assert_eq!(tweet_id("https://x.com/u/status/12345").as_deref(), Some("12345"));
        assert_eq!(
            tweet_id("https://twitter.com/someone/status/1790000000000000001?s=20").as_deref(),
            Some("1790000000000000001")
        );
        assert_eq!(
            tweet_id("https://mobile.twitter.com/a/status/42/video/1").as_deref(),
            Some("42")
        );
        assert_eq!(tweet_id("  X.COM/u/status/7  ").as_deref(), Some("7"));
    }

    #[test]
    fn test_embed_fixer_domains_are_twitter() {
        assert_eq!(tweet_id("https://fxtwitter.com/u/status/123").as_deref(), Some("123"));
        assert_eq!(tweet_id("https://vxtwitter.com/u/status/456").as_deref(), Some("456"));
        assert_eq!(tweet_id("https://fixupx.com/u/status/789").as_deref(), Some("789"));
        assert_eq!(tweet_id("https://fixvx.com/u/status/10").as_deref(), Some("10"));

        let err = resolve_reference("https://fxtwitter.com/someone").unwrap_err();
        assert!(matches!(err, DigestError::UnrecognizedUrl(_)));
    }

    #[test]
    fn test_twitter_reference_keeps_url() {
        let reference = resolve_reference("https://x.com/u/status/12345").unwrap();
        assert_eq!(reference.source_kind(), SourceKind::Twitter);
        assert_eq!(reference.source_url(), "https://x.com/u/status/12345");
        assert_eq!(reference.id(), "12345");
    }

    #[test]
    fn test_twitter_domain_without_status_is_rejected() {
        let err = resolve_reference("https://x.com/someone").unwrap_err();
        assert!(matches!(err, DigestError::UnrecognizedUrl(_)));

        let err = resolve_reference("https://twitter.com/someone/status/abc").unwrap_err();
        assert!(matches!(err, DigestError::UnrecognizedUrl(_)));
    }

    #[test]
    fn test_other_domains_are_never_twitter() {
        assert_eq!(tweet_id("https://netflix.com/status/12345"), None);
        assert_eq!(tweet_id("https://example.com/u/status/12345"), None);
        assert_eq!(tweet_id("status/12345"), None);
    }

    #[test]
    fn test_bare_string_is_youtube_id() {
        let reference = resolve_reference("abc123").unwrap();
        assert_eq!(
            reference,
            VideoReference::YouTube {
                video_id: "abc123".to_string()
            }
        );
        assert_eq!(reference.source_url(), "https://www.youtube.com/watch?v=abc123");
    }

    #[test]
    fn test_youtube_urls_are_normalized() {
        for input in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://m.youtube.com/embed/dQw4w9WgXcQ",
        ] {
            assert_eq!(resolve_reference(input).unwrap().id(), "dQw4w9WgXcQ", "{input}");
        }
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(matches!(
            resolve_reference("   "),
            Err(DigestError::UnrecognizedUrl(_))
        ));
    }

    #[test]
    fn test_content_text() {
        let transcript = ExtractedContent::Transcript("Hello world".into());
        assert_eq!(transcript.text(), "Hello world");

        let video = ExtractedContent::VideoBytes {
            bytes: vec![0; 4],
            mime_type: "video/mp4",
            caption: "look at this".into(),
        };
        assert_eq!(video.text(), "look at this");
        assert_eq!(format!("{video:?}"), "VideoBytes { len: 4, mime_type: \"video/mp4\" }");
    }
}
