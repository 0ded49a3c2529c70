use reqwest::Client;
use std::path::PathBuf;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::extractors::twitter::TwitterExtractor;
use crate::extractors::youtube::YoutubeExtractor;
use crate::extractors::{resolve_reference, ExtractedContent, VideoMetadata, VideoReference};
use crate::output::{render_report, ArtifactStore};
use crate::summarize::{build_summarizer, select_provider, ApiKeys, Provider, Summarizer, SummaryResult};
use crate::{DigestError, Result};

const USER_AGENT: &str = concat!("tube-digest/", env!("CARGO_PKG_VERSION"));

/// One summarization request
#[derive(Debug, Clone, Default)]
pub struct SummaryRequest {
    /// Video URL or bare YouTube id
    pub input: String,

    /// Preferred backend; falls back to the configured default
    pub provider: Option<Provider>,

    /// Keys supplied with the request, used only where configuration has none
    pub keys: ApiKeys,
}

impl SummaryRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }
}

/// Everything produced by a successful run
#[derive(Debug, Clone)]
pub struct DigestReport {
    pub reference: VideoReference,
    pub metadata: VideoMetadata,

    /// Transcript for YouTube, tweet caption for Twitter/X
    pub transcript: String,

    pub result: SummaryResult,

    /// Standalone HTML document
    pub report_html: String,
}

impl DigestReport {
    /// Write the transcript and report, returning both paths
    pub fn persist(&self, store: &ArtifactStore) -> Result<(PathBuf, PathBuf)> {
        let id = self.reference.id();
        let transcript_path = store.save_transcript(id, &self.transcript)?;
        let summary_path = match store.save_summary(id, &self.report_html) {
            Ok(path) => path,
            Err(e) => {
                if let Err(cleanup) = fs_err::remove_file(&transcript_path) {
                    tracing::warn!("Could not remove partial transcript: {}", cleanup);
                }
                return Err(e);
            }
        };

        tracing::info!(
            "Saved artifacts for {}: {}, {}",
            id,
            transcript_path.display(),
            summary_path.display()
        );
        Ok((transcript_path, summary_path))
    }
}

/// Resolve, fetch metadata, extract content, summarize and render
pub struct SummaryPipeline {
    config: Config,
    client: Client,
    youtube: YoutubeExtractor,
    twitter: TwitterExtractor,
}

impl SummaryPipeline {
    /// Create a pipeline with its own HTTP client
    pub fn new(config: Config) -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: Config, client: Client) -> Self {
        let youtube = YoutubeExtractor::new(client.clone(), &config.sources);
        let twitter = TwitterExtractor::new(client.clone(), &config.sources);

        Self {
            config,
            client,
            youtube,
            twitter,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run a request end to end under its own request span
    pub async fn run(&self, request: &SummaryRequest) -> Result<DigestReport> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("summarize", %request_id, input = %request.input.trim());

        async {
            let result = self.execute(request).await;
            match &result {
                Ok(report) => tracing::info!(
                    "Summarized {} {} with {}",
                    report.reference.source_kind().platform_name(),
                    report.reference.id(),
                    report.result.provider
                ),
                Err(e) if e.is_fatal() => tracing::error!(error = %e, kind = e.kind(), "Summarization failed"),
                Err(e) => tracing::warn!(error = %e, kind = e.kind(), "Nothing to summarize"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, request: &SummaryRequest) -> Result<DigestReport> {
        let reference = resolve_reference(&request.input)?;
        let keys = self.config.keys.or(&request.keys);

        let preference = request.provider.or(self.config.llm.default_provider);
        let provider = select_provider(preference, &keys, reference.source_kind())?;

        if matches!(reference, VideoReference::YouTube { .. }) && keys.youtube.is_none() {
            return Err(DigestError::MissingApiKey(
                "a YouTube Data API key is required to look up YouTube videos".to_string(),
            ));
        }

        let summarizer = build_summarizer(provider, &keys, &self.config.llm, self.client.clone())?;
        self.run_with(&reference, &keys, summarizer.as_ref()).await
    }

    /// Run the stages for an already resolved reference with a chosen backend
    pub async fn run_with(
        &self,
        reference: &VideoReference,
        keys: &ApiKeys,
        summarizer: &dyn Summarizer,
    ) -> Result<DigestReport> {
        summarizer.check_ready().await?;

        let (metadata, content) = match reference {
            VideoReference::YouTube { video_id } => {
                let api_key = keys.youtube.as_deref().ok_or_else(|| {
                    DigestError::MissingApiKey("a YouTube Data API key is required".to_string())
                })?;

                tracing::info!("Fetching YouTube metadata for {}", video_id);
                let metadata = self.youtube.fetch_metadata(video_id, api_key).await?;

                tracing::info!("Fetching transcript for \"{}\"", metadata.title);
                let transcript = self.youtube.fetch_transcript(video_id).await?;

                (metadata, ExtractedContent::Transcript(transcript))
            }
            VideoReference::Twitter { tweet_id, .. } => {
                tracing::info!("Looking up tweet {}", tweet_id);
                let lookup = self.twitter.lookup(tweet_id).await?;

                let content = self.twitter.extract_video(&lookup.tweet).await?;
                (lookup.metadata, content)
            }
        };

        tracing::info!("Summarizing {:?} with {}", content, summarizer.provider());
        let summary_html = summarizer.summarize(&content).await?;

        let report_html = render_report(&metadata, &summary_html, reference);

        Ok(DigestReport {
            reference: reference.clone(),
            metadata,
            transcript: content.text().to_string(),
            result: SummaryResult {
                summary_html,
                source_kind: reference.source_kind(),
                provider: summarizer.provider(),
            },
            report_html,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LlmConfig, SourcesConfig};
    use crate::summarize::MockSummarizer;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> Config {
        Config {
            llm: LlmConfig {
                openai_base_url: server.uri(),
                gemini_base_url: server.uri(),
                ..LlmConfig::default()
            },
            sources: SourcesConfig {
                youtube_data_api_base: server.uri(),
                youtube_base: server.uri(),
                twitter_mirror_base: server.uri(),
                ..SourcesConfig::default()
            },
            ..Config::default()
        }
    }

    async fn mount_youtube(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/youtube/v3/videos"))
            .and(query_param("id", "abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"snippet": {"title": "Learning Rust", "channelTitle": "Ferris"}}]
            })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/youtubei/v1/player"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "captions": {"playerCaptionsTracklistRenderer": {"captionTracks": [
                    {"baseUrl": format!("{}/api/timedtext?v=abc123&lang=en", server.uri()), "languageCode": "en"}
                ]}}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/timedtext"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "events": [{"segs": [{"utf8": "Hello"}]}, {"segs": [{"utf8": "world"}]}]
            })))
            .mount(server)
            .await;
    }

    fn request(input: &str) -> SummaryRequest {
        SummaryRequest {
            input: input.to_string(),
            provider: Some(Provider::Openai),
            keys: ApiKeys {
                openai: Some("sk-test".into()),
                gemini: None,
                youtube: Some("yt-test".into()),
            },
        }
    }

    #[tokio::test]
    async fn test_youtube_end_to_end() {
        let server = MockServer::start().await;
        mount_youtube(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "<h3>Key Takeaways</h3><ul><li>Rust is friendly</li></ul>"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let pipeline = SummaryPipeline::new(config_for(&server)).unwrap();
        let report = pipeline.run(&request("abc123")).await.unwrap();

        assert_eq!(report.reference.id(), "abc123");
        assert_eq!(report.transcript, "Hello world");
        assert_eq!(report.result.provider, Provider::Openai);
        assert!(report.result.summary_html.contains("<h3>Key Takeaways"));
        assert!(report.result.summary_html.contains("<li>"));
        assert!(report.report_html.contains("Learning Rust"));
        assert!(report.report_html.contains("https://www.youtube.com/watch?v=abc123"));

        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        report.persist(&store).unwrap();
        assert_eq!(store.read_transcript("abc123").unwrap().as_deref(), Some("Hello world"));
        assert!(store.read_summary("abc123").unwrap().unwrap().contains("Learning Rust"));
    }

    #[tokio::test]
    async fn test_youtube_needs_data_api_key() {
        let server = MockServer::start().await;
        let mut req = request("abc123");
        req.keys.youtube = None;

        let pipeline = SummaryPipeline::new(config_for(&server)).unwrap();
        let err = pipeline.run(&req).await.unwrap_err();
        assert!(matches!(err, DigestError::MissingApiKey(_)));
    }

    #[tokio::test]
    async fn test_unknown_video_stops_before_summary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
            .mount(&server)
            .await;

        let pipeline = SummaryPipeline::new(config_for(&server)).unwrap();
        let reference = VideoReference::YouTube {
            video_id: "missing".into(),
        };
        let mut summarizer = MockSummarizer::new();
        summarizer.expect_check_ready().returning(|| Ok(()));
        summarizer.expect_summarize().times(0);

        let err = pipeline
            .run_with(&reference, &request("missing").keys, &summarizer)
            .await
            .unwrap_err();
        assert!(matches!(err, DigestError::VideoNotFound(_)));
    }

    #[tokio::test]
    async fn test_oversized_tweet_video_is_never_summarized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200,
                "tweet": {
                    "text": "big launch",
                    "author": {"name": "Space", "screen_name": "space"},
                    "media": {"videos": [{"url": format!("{}/video/big.mp4", server.uri())}]}
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/video/big.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 15 * 1024 * 1024 + 1]))
            .mount(&server)
            .await;

        let pipeline = SummaryPipeline::new(config_for(&server)).unwrap();
        let reference = resolve_reference("https://x.com/space/status/42").unwrap();

        let mut summarizer = MockSummarizer::new();
        summarizer.expect_provider().return_const(Provider::Gemini);
        summarizer.expect_check_ready().returning(|| Ok(()));
        summarizer.expect_summarize().times(0);

        let err = pipeline
            .run_with(&reference, &ApiKeys::default(), &summarizer)
            .await
            .unwrap_err();
        assert!(matches!(err, DigestError::ContentTooLarge { limit, .. } if limit == 15 * 1024 * 1024));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_tweet_video_reaches_summarizer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tweet": {
                    "text": "clip of the day",
                    "author": {"name": "", "screen_name": "clips"},
                    "media": {"all": [{"type": "photo", "url": "https://pbs.example/p.jpg"}, {"type": "video", "url": format!("{}/v/clip.webm", server.uri())}]}
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v/clip.webm"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 64]))
            .mount(&server)
            .await;

        let mut summarizer = MockSummarizer::new();
        summarizer.expect_provider().return_const(Provider::Gemini);
        summarizer.expect_check_ready().returning(|| Ok(()));
        summarizer
            .expect_summarize()
            .withf(|content| {
                matches!(content, ExtractedContent::VideoBytes { bytes, mime_type, caption }
                    if bytes.len() == 64 && *mime_type == "video/webm" && caption == "clip of the day")
            })
            .times(1)
            .returning(|_| Ok("<p>A clip</p>".to_string()));

        let pipeline = SummaryPipeline::new(config_for(&server)).unwrap();
        let reference = resolve_reference("https://twitter.com/clips/status/7").unwrap();
        let report = pipeline
            .run_with(&reference, &ApiKeys::default(), &summarizer)
            .await
            .unwrap();

        assert_eq!(report.metadata.author_name, "clips");
        assert_eq!(report.transcript, "clip of the day");
        assert_eq!(report.result.provider, Provider::Gemini);
        assert!(report.report_html.contains("https://twitter.com/clips/status/7"));
    }

    #[tokio::test]
    async fn test_invalid_gemini_key_fails_before_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/status/42"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut req = request("https://x.com/space/status/42");
        req.keys.gemini = Some("bad-key".into());

        let pipeline = SummaryPipeline::new(config_for(&server)).unwrap();
        let err = pipeline.run(&req).await.unwrap_err();
        assert!(matches!(err, DigestError::InvalidApiKey("Gemini")));
    }

    #[test]
    fn test_failed_persist_leaves_no_partial_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        std::fs::create_dir_all(store.summary_path("abc123")).unwrap();

        let report = DigestReport {
            reference: VideoReference::YouTube {
                video_id: "abc123".into(),
            },
            metadata: VideoMetadata {
                title: "Learning Rust".into(),
                author_name: "Ferris".into(),
            },
            transcript: "Hello world".into(),
            result: SummaryResult {
                summary_html: "<p>x</p>".into(),
                source_kind: crate::extractors::SourceKind::YouTube,
                provider: Provider::Openai,
            },
            report_html: "<html></html>".into(),
        };

        assert!(report.persist(&store).is_err());
        assert!(!store.transcript_path("abc123").exists());
    }

    #[tokio::test]
    async fn test_twitter_without_gemini_key_does_no_network_work() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let pipeline = SummaryPipeline::new(config_for(&server)).unwrap();
        let err = pipeline
            .run(&request("https://x.com/u/status/12345"))
            .await
            .unwrap_err();
        assert!(matches!(err, DigestError::MissingApiKey(_)));
    }
}
