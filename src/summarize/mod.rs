use async_trait::async_trait;
use clap::ValueEnum;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub mod gemini;
pub mod openai;

use crate::config::LlmConfig;
use crate::extractors::{ExtractedContent, SourceKind};
use crate::{DigestError, Result};

pub use gemini::GeminiSummarizer;
pub use openai::OpenAiSummarizer;

/// Fixed instructions sent with every summarization request
pub const SUMMARY_PROMPT: &str = include_str!("./prompts/summary.txt");

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").expect("valid regex"));

static DOCUMENT_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body[^>]*>(.*)</body>").expect("valid regex"));

/// LLM backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI chat completions (text only)
    Openai,
    /// Google Gemini (text or video)
    Gemini,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Openai => write!(f, "openai"),
            Provider::Gemini => write!(f, "gemini"),
        }
    }
}

/// API credentials for one request
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube: Option<String>,
}

impl ApiKeys {
    /// Keep every key set here, filling gaps from `fallback`
    pub fn or(&self, fallback: &ApiKeys) -> ApiKeys {
        fn pick(primary: &Option<String>, fallback: &Option<String>) -> Option<String> {
            primary
                .iter()
                .chain(fallback.iter())
                .map(|k| k.trim())
                .find(|k| !k.is_empty())
                .map(str::to_string)
        }

        ApiKeys {
            openai: pick(&self.openai, &fallback.openai),
            gemini: pick(&self.gemini, &fallback.gemini),
            youtube: pick(&self.youtube, &fallback.youtube),
        }
    }

    pub fn for_provider(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Openai => self.openai.as_deref(),
            Provider::Gemini => self.gemini.as_deref(),
        }
    }
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |key: &Option<String>| key.as_ref().map(|_| "***");
        f.debug_struct("ApiKeys")
            .field("openai", &mask(&self.openai))
            .field("gemini", &mask(&self.gemini))
            .field("youtube", &mask(&self.youtube))
            .finish()
    }
}

/// Terminal artifact of summarization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryResult {
    pub summary_html: String,
    pub source_kind: SourceKind,
    pub provider: Provider,
}

/// A backend that turns extracted content into an HTML summary fragment
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Which backend this is
    fn provider(&self) -> Provider;

    /// Check credentials and model access before any content is fetched
    async fn check_ready(&self) -> Result<()> {
        Ok(())
    }

    /// Summarize content into HTML prose (no markdown, no full document)
    async fn summarize(&self, content: &ExtractedContent) -> Result<String>;
}

/// Decide which backend serves a request.
///
/// Twitter/X content always needs Gemini, whatever the preference. Otherwise an
/// explicit preference must have its key; with no preference Gemini wins when
/// its key is present.
pub fn select_provider(
    preference: Option<Provider>,
    keys: &ApiKeys,
    source: SourceKind,
) -> Result<Provider> {
    if source == SourceKind::Twitter {
        if keys.gemini.is_none() {
            return Err(DigestError::MissingApiKey(
                "a Gemini API key is required to summarize Twitter/X videos".to_string(),
            ));
        }
        if preference == Some(Provider::Openai) {
            tracing::info!("Ignoring OpenAI preference: Twitter/X videos need Gemini");
        }
        return Ok(Provider::Gemini);
    }

    match preference {
        Some(provider) if keys.for_provider(provider).is_some() => Ok(provider),
        Some(provider) => Err(DigestError::MissingApiKey(format!(
            "no API key configured for {}",
            provider
        ))),
        None if keys.gemini.is_some() => Ok(Provider::Gemini),
        None if keys.openai.is_some() => Ok(Provider::Openai),
        None => Err(DigestError::MissingApiKey(
            "configure an OpenAI or Gemini API key".to_string(),
        )),
    }
}

/// Construct the per-request backend for `provider`
pub fn build_summarizer(
    provider: Provider,
    keys: &ApiKeys,
    llm: &LlmConfig,
    client: Client,
) -> Result<Box<dyn Summarizer>> {
    let key = keys
        .for_provider(provider)
        .ok_or_else(|| DigestError::MissingApiKey(format!("no API key configured for {}", provider)))?
        .to_string();

    Ok(match provider {
        Provider::Openai => Box::new(OpenAiSummarizer::new(client, key, llm)),
        Provider::Gemini => Box::new(GeminiSummarizer::new(client, key, llm)),
    })
}

/// Normalize model output to an embeddable HTML fragment
pub fn clean_summary_html(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(inner) = CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        text = inner.as_str();
    }

    if let Some(body) = DOCUMENT_BODY.captures(text).and_then(|c| c.get(1)) {
        text = body.as_str();
    }

    text.trim().to_string()
}

/// Text block appended after the prompt for transcript summaries
pub(crate) fn transcript_message(transcript: &str) -> String {
    format!("{}\n\nTranscript:\n{}", SUMMARY_PROMPT, transcript)
}
