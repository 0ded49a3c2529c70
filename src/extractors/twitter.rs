use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::{ExtractedContent, VideoMetadata};
use crate::config::SourcesConfig;
use crate::utils::{format_file_size, truncate_title, validate_and_normalize_url};
use crate::{DigestError, Result};

/// Hard cap on downloaded tweet video size (15 MiB)
pub const MAX_VIDEO_BYTES: u64 = 15 * 1024 * 1024;

const MAX_TITLE_CHARS: usize = 100;

/// Twitter/X lookups through a public mirror API, plus video download
pub struct TwitterExtractor {
    client: Client,
    mirror_base: String,
    mirror_timeout: Duration,
    download_timeout: Duration,
    max_video_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct MirrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    tweet: Option<Tweet>,
}

/// Tweet as exposed by the mirror API
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Tweet {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub author: TweetAuthor,
    #[serde(default)]
    media: Option<TweetMedia>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TweetAuthor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub screen_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TweetMedia {
    #[serde(default)]
    videos: Vec<TweetVideo>,
    /// Mixed media items; sometimes nested arrays
    #[serde(default)]
    all: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TweetVideo {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    variants: Vec<VideoVariant>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct VideoVariant {
    #[serde(default)]
    url: Option<String>,
}

/// Result of the existence check: display metadata plus the tweet body
#[derive(Debug, Clone)]
pub struct TweetLookup {
    pub metadata: VideoMetadata,
    pub tweet: Tweet,
}

impl TwitterExtractor {
    pub fn new(client: Client, sources: &SourcesConfig) -> Self {
        Self {
            client,
            mirror_base: sources.twitter_mirror_base.trim_end_matches('/').to_string(),
            mirror_timeout: sources.mirror_timeout(),
            download_timeout: sources.download_timeout(),
            max_video_bytes: MAX_VIDEO_BYTES,
        }
    }

    pub fn with_mirror_timeout(mut self, timeout: Duration) -> Self {
        self.mirror_timeout = timeout;
        self
    }

    pub fn with_max_video_bytes(mut self, max_bytes: u64) -> Self {
        self.max_video_bytes = max_bytes;
        self
    }

    /// Confirm the tweet exists and derive display metadata from it
    pub async fn lookup(&self, tweet_id: &str) -> Result<TweetLookup> {
        let url = format!("{}/status/{}", self.mirror_base, tweet_id);
        tracing::debug!("Looking up tweet via mirror: {}", url);

        let timeout_error = || DigestError::UpstreamTimeout(format!("tweet lookup for {tweet_id}"));

        let response = self
            .client
            .get(&url)
            .timeout(self.mirror_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    timeout_error()
                } else {
                    DigestError::metadata(None, e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DigestError::TweetNotFound(tweet_id.to_string()));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                timeout_error()
            } else {
                DigestError::metadata(Some(status.as_u16()), e.to_string())
            }
        })?;

        if !status.is_success() {
            return Err(DigestError::metadata(Some(status.as_u16()), body));
        }

        let mirror: MirrorResponse = serde_json::from_str(&body)
            .map_err(|e| DigestError::metadata(None, format!("Invalid mirror API response: {e}")))?;

        let tweet = mirror.tweet.ok_or_else(|| {
            tracing::warn!(
                "Mirror returned no tweet for {}: {}",
                tweet_id,
                mirror.message.as_deref().unwrap_or("no message")
            );
            DigestError::TweetNotFound(tweet_id.to_string())
        })?;

        let author_name = if tweet.author.name.is_empty() {
            tweet.author.screen_name.clone()
        } else {
            tweet.author.name.clone()
        };

        let title = match truncate_title(&tweet.text, MAX_TITLE_CHARS) {
            text if text.is_empty() => format!("Tweet by {}", author_name),
            text => text,
        };

        Ok(TweetLookup {
            metadata: VideoMetadata { title, author_name },
            tweet,
        })
    }

    /// Locate and download the tweet's video
    pub async fn extract_video(&self, tweet: &Tweet) -> Result<ExtractedContent> {
        let video_url = video_url(tweet).ok_or(DigestError::NoVideoInTweet)?;

        let video_url = validate_and_normalize_url(&video_url).map_err(|e| {
            tracing::warn!("Ignoring unusable tweet video URL: {}", e);
            DigestError::NoVideoInTweet
        })?;

        let bytes = self.download(&video_url).await?;

        Ok(ExtractedContent::VideoBytes {
            mime_type: mime_type_for(&video_url),
            bytes,
            caption: tweet.text.clone(),
        })
    }

    /// Download a video body, aborting as soon as it exceeds the size cap
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        tracing::info!("Downloading tweet video: {}", url);

        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                DigestError::UpstreamTimeout("video download".to_string())
            } else {
                DigestError::Http(e)
            }
        };

        let response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(map_err)?
            .error_for_status()?;

        if let Some(size) = response.content_length() {
            if size > self.max_video_bytes {
                return Err(DigestError::ContentTooLarge {
                    size,
                    limit: self.max_video_bytes,
                });
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_err)?;
            bytes.extend_from_slice(&chunk);

            if bytes.len() as u64 > self.max_video_bytes {
                return Err(DigestError::ContentTooLarge {
                    size: bytes.len() as u64,
                    limit: self.max_video_bytes,
                });
            }
        }

        tracing::info!("Downloaded {}", format_file_size(bytes.len() as u64));
        Ok(bytes)
    }
}

/// Video URL in precedence order: first video's url, its last variant,
/// then the first video item of the flattened `media.all` list
pub fn video_url(tweet: &Tweet) -> Option<String> {
    let media = tweet.media.as_ref()?;
    let non_empty = |url: &Option<String>| url.clone().filter(|u| !u.trim().is_empty());

    if let Some(video) = media.videos.first() {
        if let Some(url) = non_empty(&video.url) {
            return Some(url);
        }
        if let Some(url) = video.variants.last().and_then(|v| non_empty(&v.url)) {
            return Some(url);
        }
    }

    let mut items = Vec::new();
    flatten_media(&media.all, &mut items);

    items
        .into_iter()
        .find(|item| item.get("type").and_then(Value::as_str) == Some("video"))
        .and_then(|item| item.get("url"))
        .and_then(Value::as_str)
        .filter(|url| !url.trim().is_empty())
        .map(str::to_string)
}

fn flatten_media<'a>(values: &'a [Value], out: &mut Vec<&'a Value>) {
    for value in values {
        match value {
            Value::Array(inner) => flatten_media(inner, out),
            other => out.push(other),
        }
    }
}

/// Mime type inferred from the URL path suffix
pub fn mime_type_for(url: &str) -> &'static str {
    let path = Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.split('?').next().unwrap_or(url).to_lowercase());

    if path.ends_with(".webm") {
        "video/webm"
    } else if path.ends_with(".mov") {
        "video/mov"
    } else {
        "video/mp4"
    }
}
