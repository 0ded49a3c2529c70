use anyhow::Context;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::LazyLock;
use url::Url;

use super::VideoMetadata;
use crate::config::SourcesConfig;
use crate::{DigestError, Result};

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Client identity sent to the internal player API
const PLAYER_CLIENT_NAME: &str = "ANDROID";
const PLAYER_CLIENT_VERSION: &str = "20.10.38";

/// YouTube metadata lookup and transcript extraction
pub struct YoutubeExtractor {
    client: Client,
    data_api_base: String,
    youtube_base: String,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    #[serde(default)]
    channel_title: String,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PlayerResponse {
    captions: Option<PlayerCaptions>,
}

#[derive(Debug, Deserialize)]
struct PlayerCaptions {
    #[serde(rename = "playerCaptionsTracklistRenderer")]
    tracklist: CaptionTrackList,
}

#[derive(Debug, Deserialize)]
struct CaptionTrackList {
    #[serde(rename = "captionTracks", default)]
    caption_tracks: Vec<CaptionTrack>,
}

/// One per-language caption resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    #[serde(default)]
    language_code: String,
    /// `asr` for auto-generated tracks
    #[serde(default)]
    kind: Option<String>,
}

impl CaptionTrack {
    fn is_english(&self) -> bool {
        let code = self.language_code.to_lowercase();
        code == "en" || code.starts_with("en-")
    }

    fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

#[derive(Debug, Deserialize)]
struct TimedText {
    #[serde(default)]
    events: Vec<TimedTextEvent>,
}

#[derive(Debug, Deserialize)]
struct TimedTextEvent {
    #[serde(default)]
    segs: Vec<TimedTextSegment>,
}

#[derive(Debug, Deserialize)]
struct TimedTextSegment {
    #[serde(default)]
    utf8: String,
}

impl YoutubeExtractor {
    pub fn new(client: Client, sources: &SourcesConfig) -> Self {
        Self {
            client,
            data_api_base: sources.youtube_data_api_base.trim_end_matches('/').to_string(),
            youtube_base: sources.youtube_base.trim_end_matches('/').to_string(),
        }
    }

    /// Confirm the video exists and fetch its title and channel
    pub async fn fetch_metadata(&self, video_id: &str, api_key: &str) -> Result<VideoMetadata> {
        let url = format!("{}/youtube/v3/videos", self.data_api_base);
        tracing::debug!("Looking up YouTube metadata for {}", video_id);

        let response = self
            .client
            .get(&url)
            .query(&[("part", "snippet"), ("id", video_id), ("key", api_key)])
            .send()
            .await
            .map_err(|e| {
                let status = e.status().map(|s| s.as_u16());
                DigestError::metadata(status, e.without_url().to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GoogleErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(DigestError::metadata(Some(status.as_u16()), message));
        }

        let list: VideoListResponse = response
            .json()
            .await
            .map_err(|e| {
                DigestError::metadata(None, format!("Invalid YouTube API response: {}", e.without_url()))
            })?;

        let item = list
            .items
            .into_iter()
            .next()
            .ok_or_else(|| DigestError::VideoNotFound(video_id.to_string()))?;

        Ok(VideoMetadata {
            title: item.snippet.title,
            author_name: item.snippet.channel_title,
        })
    }

    /// Fetch the transcript, falling back from the structured transcript to raw caption XML
    pub async fn fetch_transcript(&self, video_id: &str) -> Result<String> {
        match self.fetch_structured_transcript(video_id).await {
            Ok(text) if !text.is_empty() => return Ok(text),
            Ok(_) => tracing::warn!("Structured transcript for {} was empty", video_id),
            Err(e) => tracing::warn!("Structured transcript for {} failed: {:#}", video_id, e),
        }

        match self.fetch_caption_track_transcript(video_id).await {
            Ok(text) if !text.is_empty() => Ok(text),
            Ok(_) => {
                tracing::warn!("Caption track for {} contained no text", video_id);
                Err(DigestError::NoCaptionsAvailable)
            }
            Err(e) => {
                tracing::warn!("Caption track fallback for {} failed: {:#}", video_id, e);
                Err(DigestError::NoCaptionsAvailable)
            }
        }
    }

    /// English transcript segments from the internal player API, joined by single spaces
    async fn fetch_structured_transcript(&self, video_id: &str) -> anyhow::Result<String> {
        let url = format!("{}/youtubei/v1/player?prettyPrint=false", self.youtube_base);
        let body = serde_json::json!({
            "context": {
                "client": {
                    "clientName": PLAYER_CLIENT_NAME,
                    "clientVersion": PLAYER_CLIENT_VERSION,
                    "hl": "en"
                }
            },
            "videoId": video_id
        });

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("player API returned HTTP {}", response.status());
        }

        let player: PlayerResponse = response.json().await.context("invalid player response")?;
        let tracks = player
            .captions
            .map(|c| c.tracklist.caption_tracks)
            .unwrap_or_default();

        let track = pick_english_track(&tracks).context("no English transcript")?;
        let track_url = with_format(&track.base_url, Some("json3"))?;
        tracing::debug!("Fetching structured transcript from {}", track_url);

        let response = self.client.get(&track_url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("timed text returned HTTP {}", response.status());
        }

        let timed_text: TimedText = response.json().await.context("invalid timed text")?;
        Ok(join_segments(&timed_text))
    }

    /// Scan the watch page caption tracks and decode the raw caption XML
    async fn fetch_caption_track_transcript(&self, video_id: &str) -> anyhow::Result<String> {
        let url = format!("{}/watch", self.youtube_base);
        let html = self
            .client
            .get(&url)
            .query(&[("v", video_id)])
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let tracks = caption_tracks_from_watch_page(&html)?;
        let track = pick_fallback_track(&tracks).context("video has no caption tracks")?;
        tracing::info!("Using {} caption track for {}", track.language_code, video_id);

        let track_url = with_format(&track.base_url, None)?;
        let xml = self
            .client
            .get(&track_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(decode_caption_xml(&xml))
    }
}

/// Extract a video id from a YouTube watch, short-link, shorts or embed URL
pub fn video_id_from_url(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let is_youtube = host == "youtube.com" || host == "youtu.be" || host.ends_with(".youtube.com");
    if !is_youtube {
        return None;
    }

    if host == "youtu.be" {
        let segment = url.path_segments()?.next()?.trim();
        return (!segment.is_empty()).then(|| segment.to_string());
    }

    if url.path().starts_with("/watch") {
        return url
            .query_pairs()
            .find(|(k, v)| k == "v" && !v.trim().is_empty())
            .map(|(_, v)| v.trim().to_string());
    }

    let mut segments = url.path_segments()?;
    let kind = segments.next().unwrap_or("");
    let id = segments.next().unwrap_or("").trim();
    if (kind == "shorts" || kind == "embed" || kind == "live") && !id.is_empty() {
        return Some(id.to_string());
    }

    None
}

/// Manually created English track first, then auto-generated English
fn pick_english_track(tracks: &[CaptionTrack]) -> Option<&CaptionTrack> {
    tracks
        .iter()
        .find(|t| t.is_english() && !t.is_generated())
        .or_else(|| tracks.iter().find(|t| t.is_english()))
}

/// English track if there is one, else the first available
fn pick_fallback_track(tracks: &[CaptionTrack]) -> Option<&CaptionTrack> {
    tracks.iter().find(|t| t.is_english()).or_else(|| tracks.first())
}

fn caption_tracks_from_watch_page(html: &str) -> anyhow::Result<Vec<CaptionTrack>> {
    const MARKER: &str = "\"captionTracks\":";

    let start = html
        .find(MARKER)
        .context("watch page has no caption track list")?
        + MARKER.len();

    serde_json::Deserializer::from_str(&html[start..])
        .into_iter::<Vec<CaptionTrack>>()
        .next()
        .context("caption track list is empty")?
        .context("malformed caption track list")
}

/// Rewrite the `fmt` query parameter of a caption URL (`None` requests the default XML)
fn with_format(base_url: &str, format: Option<&str>) -> anyhow::Result<String> {
    let mut url = Url::parse(base_url).context("invalid caption track URL")?;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "fmt")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear().extend_pairs(pairs);
        if let Some(format) = format {
            query.append_pair("fmt", format);
        }
    }

    Ok(url.into())
}

fn join_segments(timed_text: &TimedText) -> String {
    timed_text
        .events
        .iter()
        .map(|event| {
            event
                .segs
                .iter()
                .map(|seg| seg.utf8.as_str())
                .collect::<String>()
                .replace('\n', " ")
        })
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reverse the document-level XML escaping of text nodes
fn decode_xml_escapes(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Entities YouTube leaves inside caption text, unescaped in this exact order
fn unescape_caption_entities(text: &str) -> String {
    text.replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

/// Plain text from a raw caption XML document
pub fn decode_caption_xml(xml: &str) -> String {
    let stripped = TAG.replace_all(xml, " ");
    let text = unescape_caption_entities(&decode_xml_escapes(&stripped));
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn extractor(server: &MockServer) -> YoutubeExtractor {
        let sources = SourcesConfig {
            youtube_data_api_base: server.uri(),
            youtube_base: server.uri(),
            ..SourcesConfig::default()
        };
        YoutubeExtractor::new(Client::new(), &sources)
    }

    fn track(code: &str, kind: Option<&str>) -> CaptionTrack {
        CaptionTrack {
            base_url: format!("https://www.youtube.com/api/timedtext?lang={code}"),
            language_code: code.to_string(),
            kind: kind.map(str::to_string),
        }
    }

    #[test]
    fn test_decode_caption_entities() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript><text start="0" dur="1.5">Tom &amp;amp; Jerry</text><text start="1.5" dur="2">&amp;quot;test&amp;quot;</text></transcript>"#;
        assert_eq!(decode_caption_xml(xml), "Tom & Jerry \"test\"");
    }

    #[test]
    fn test_decode_collapses_whitespace() {
        let xml = "<transcript>\n  <text start=\"0\">it&amp;#39;s\n  here</text>\n<text start=\"1\">  &amp;lt;b&amp;gt;  </text></transcript>";
        assert_eq!(decode_caption_xml(xml), "it's here <b>");
    }

    #[test]
    fn test_track_preference() {
        let tracks = vec![track("de", None), track("en", Some("asr")), track("en-GB", None)];
        assert_eq!(pick_english_track(&tracks).unwrap().language_code, "en-GB");
        assert_eq!(pick_fallback_track(&tracks).unwrap().language_code, "en");

        let tracks = vec![track("fr", None), track("de", None)];
        assert!(pick_english_track(&tracks).is_none());
        assert_eq!(pick_fallback_track(&tracks).unwrap().language_code, "fr");
        assert!(pick_fallback_track(&[]).is_none());
    }

    #[test]
    fn test_caption_tracks_from_watch_page() {
        let html = r#"<script>var ytInitialPlayerResponse = {"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[{"baseUrl":"https://www.youtube.com/api/timedtext?v=abc&lang=en","languageCode":"en"}],"audioTracks":[]}}};</script>"#;
        let tracks = caption_tracks_from_watch_page(html).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].base_url, "https://www.youtube.com/api/timedtext?v=abc&lang=en");

        assert!(caption_tracks_from_watch_page("<html></html>").is_err());
    }

    #[test]
    fn test_with_format_replaces_existing() {
        let url = with_format("https://www.youtube.com/api/timedtext?v=abc&fmt=srv3&lang=en", Some("json3")).unwrap();
        assert_eq!(url, "https://www.youtube.com/api/timedtext?v=abc&lang=en&fmt=json3");

        let url = with_format("https://www.youtube.com/api/timedtext?v=abc&fmt=srv3", None).unwrap();
        assert_eq!(url, "https://www.youtube.com/api/timedtext?v=abc");
    }

    #[test]
    fn test_join_segments() {
        let timed_text: TimedText = serde_json::from_value(serde_json::json!({
            "events": [
                {"tStartMs": 0, "segs": [{"utf8": "Hello"}, {"utf8": " world"}]},
                {"tStartMs": 900, "segs": [{"utf8": "\n"}]},
                {"tStartMs": 1000},
                {"tStartMs": 1200, "segs": [{"utf8": "again"}]}
            ]
        }))
        .unwrap();
        assert_eq!(join_segments(&timed_text), "Hello world again");
    }

    #[test]
    fn test_video_id_from_url() {
        let id = |s: &str| video_id_from_url(&Url::parse(s).unwrap());
        assert_eq!(id("https://www.youtube.com/watch?v=abc123&t=10").as_deref(), Some("abc123"));
        assert_eq!(id("https://youtu.be/abc123?si=x").as_deref(), Some("abc123"));
        assert_eq!(id("https://www.youtube.com/live/abc123").as_deref(), Some("abc123"));
        assert_eq!(id("https://www.youtube.com/channel/UCxyz"), None);
        assert_eq!(id("https://vimeo.com/12345"), None);
    }

    #[tokio::test]
    async fn test_metadata_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/videos"))
            .and(query_param("id", "abc123"))
            .and(query_param("key", "yt-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"snippet": {"title": "Rust in 100 Seconds", "channelTitle": "Fireship"}}]
            })))
            .mount(&server)
            .await;

        let metadata = extractor(&server).fetch_metadata("abc123", "yt-key").await.unwrap();
        assert_eq!(metadata.title, "Rust in 100 Seconds");
        assert_eq!(metadata.author_name, "Fireship");
    }

    #[tokio::test]
    async fn test_metadata_zero_items_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "kind": "youtube#videoListResponse",
                "items": []
            })))
            .mount(&server)
            .await;

        let err = extractor(&server).fetch_metadata("missing", "yt-key").await.unwrap_err();
        assert!(matches!(err, DigestError::VideoNotFound(ref id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_metadata_upstream_status_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/videos"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": 403, "message": "API key not valid."}
            })))
            .mount(&server)
            .await;

        let err = extractor(&server).fetch_metadata("abc123", "bad").await.unwrap_err();
        match err {
            DigestError::MetadataFetch { status, message } => {
                assert_eq!(status, Some(403));
                assert_eq!(message, "API key not valid.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_structured_transcript() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/youtubei/v1/player"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "captions": {"playerCaptionsTracklistRenderer": {"captionTracks": [
                    {"baseUrl": format!("{}/api/timedtext?v=abc123&lang=en&fmt=srv3", server.uri()), "languageCode": "en"}
                ]}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/timedtext"))
            .and(query_param("fmt", "json3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "events": [{"segs": [{"utf8": "Hello"}]}, {"segs": [{"utf8": "world"}]}]
            })))
            .mount(&server)
            .await;

        let transcript = extractor(&server).fetch_transcript("abc123").await.unwrap();
        assert_eq!(transcript, "Hello world");
    }

    #[tokio::test]
    async fn test_falls_back_to_caption_xml() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/youtubei/v1/player"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let track_url = format!("{}/api/timedtext?v=abc123\\u0026lang=de", server.uri());
        let watch_page = format!(
            r#"<html><script>var ytInitialPlayerResponse = {{"captions":{{"playerCaptionsTracklistRenderer":{{"captionTracks":[{{"baseUrl":"{track_url}","languageCode":"de"}}]}}}}}};</script></html>"#
        );
        Mock::given(method("GET"))
            .and(path("/watch"))
            .and(query_param("v", "abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_string(watch_page))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/timedtext"))
            .and(query_param("lang", "de"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<transcript><text start="0">Guten &amp;amp; Tag</text><text start="1">Welt</text></transcript>"#,
            ))
            .mount(&server)
            .await;

        let transcript = extractor(&server).fetch_transcript("abc123").await.unwrap();
        assert_eq!(transcript, "Guten & Tag Welt");
    }

    #[tokio::test]
    async fn test_no_captions_available() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/youtubei/v1/player"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "playabilityStatus": {"status": "OK"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/watch"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>no captions here</html>"))
            .mount(&server)
            .await;

        let err = extractor(&server).fetch_transcript("abc123").await.unwrap_err();
        assert!(matches!(err, DigestError::NoCaptionsAvailable));
        assert!(!err.is_fatal());
    }
}
