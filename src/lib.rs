//! Tube Digest - summarize YouTube and Twitter/X videos with an LLM
//!
//! This library resolves a video reference, fetches its metadata and transcript
//! (or raw video for Twitter/X), asks OpenAI or Gemini for an HTML summary and
//! renders the result as a standalone report.

pub mod cli;
pub mod config;
pub mod extractors;
pub mod output;
pub mod pipeline;
pub mod server;
pub mod summarize;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use extractors::{
    resolve_reference, ExtractedContent, SourceKind, VideoMetadata, VideoReference,
};
pub use output::{render_report, ArtifactStore};
pub use pipeline::{DigestReport, SummaryPipeline, SummaryRequest};
pub use summarize::{ApiKeys, Provider, SummaryResult, Summarizer};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, DigestError>;

const OVERLOADED_MESSAGE: &str =
    "The AI model is currently overloaded. Please try again in a few minutes.";
const RATE_LIMITED_MESSAGE: &str =
    "Rate limit reached for the AI provider. Please wait a moment and try again.";

fn http_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Every way a summarization request can fail
#[derive(thiserror::Error, Debug)]
pub enum DigestError {
    #[error("Unrecognized video URL: {0}")]
    UnrecognizedUrl(String),

    #[error("Video not found: {0}")]
    VideoNotFound(String),

    #[error("Tweet not found: {0}")]
    TweetNotFound(String),

    #[error("Metadata lookup failed{}: {message}", http_suffix(.status))]
    MetadataFetch { status: Option<u16>, message: String },

    #[error("No transcript is available for this video")]
    NoCaptionsAvailable,

    #[error("No video was found in this tweet")]
    NoVideoInTweet,

    #[error("Video is too large to summarize ({size} bytes, limit {limit} bytes)")]
    ContentTooLarge { size: u64, limit: u64 },

    #[error("Invalid API key for {0}")]
    InvalidApiKey(&'static str),

    #[error("Model {0} is not available for this API key")]
    ModelUnavailable(String),

    #[error("The summary was cut off because the model hit its output token limit")]
    ResponseTruncated,

    #[error("Summarization failed{}: {message}", http_suffix(.status))]
    SummarizationFailed { status: Option<u16>, message: String },

    #[error("Upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("Missing API key: {0}")]
    MissingApiKey(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl DigestError {
    pub fn summarization(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::SummarizationFailed {
            status,
            message: message.into(),
        }
    }

    pub fn metadata(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::MetadataFetch {
            status,
            message: message.into(),
        }
    }

    /// Non-fatal outcomes are reported as "nothing to summarize" rather than as failures
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NoCaptionsAvailable | Self::NoVideoInTweet)
    }

    /// Stable tag for JSON error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnrecognizedUrl(_) => "unrecognized_url",
            Self::VideoNotFound(_) => "video_not_found",
            Self::TweetNotFound(_) => "tweet_not_found",
            Self::MetadataFetch { .. } => "metadata_fetch_error",
            Self::NoCaptionsAvailable => "no_captions_available",
            Self::NoVideoInTweet => "no_video_in_tweet",
            Self::ContentTooLarge { .. } => "content_too_large",
            Self::InvalidApiKey(_) => "invalid_api_key",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::ResponseTruncated => "response_truncated",
            Self::SummarizationFailed { .. } => "summarization_failed",
            Self::UpstreamTimeout(_) => "upstream_timeout",
            Self::MissingApiKey(_) => "missing_api_key",
            Self::Http(_) => "http_error",
            Self::Io(_) => "io_error",
        }
    }

    /// Message shown to the caller. Overload and rate-limit signals from the
    /// LLM provider are translated to friendlier text; every other failure
    /// keeps its own message.
    pub fn user_message(&self) -> String {
        let Self::SummarizationFailed { status, message } = self else {
            return self.to_string();
        };
        let lowered = message.to_lowercase();

        if *status == Some(503) || lowered.contains("overloaded") || message.contains("UNAVAILABLE") {
            return OVERLOADED_MESSAGE.to_string();
        }

        if *status == Some(429)
            || lowered.contains("rate limit")
            || message.contains("RESOURCE_EXHAUSTED")
            || lowered.contains("quota")
        {
            return RATE_LIMITED_MESSAGE.to_string();
        }

        self.to_string()
    }
}
