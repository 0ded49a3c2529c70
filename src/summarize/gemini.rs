//! Gemini backend for transcript and video summarization.
//!
//! Every request first lists the models visible to the key: a failed listing
//! means the key is unusable, and the configured model must be in the list.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use super::{clean_summary_html, transcript_message, Provider, Summarizer, SUMMARY_PROMPT};
use crate::config::LlmConfig;
use crate::extractors::ExtractedContent;
use crate::{DigestError, Result};

const API_KEY_HEADER: &str = "x-goog-api-key";
const FINISH_MAX_TOKENS: &str = "MAX_TOKENS";

/// Multimodal backend on the Gemini `generateContent` API
pub struct GeminiSummarizer {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_output_tokens: u32,
    model_checked: OnceCell<()>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GeminiSummarizer {
    pub fn new(client: Client, api_key: impl Into<String>, llm: &LlmConfig) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: llm.gemini_base_url.trim_end_matches('/').to_string(),
            model: llm.gemini_model.clone(),
            max_output_tokens: llm.gemini_max_output_tokens,
            model_checked: OnceCell::new(),
        }
    }

    /// Validate the key by listing models and require the configured model
    async fn ensure_model_available(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/v1beta/models", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("pageSize", "1000")])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Gemini model listing failed: {}", e);
                DigestError::InvalidApiKey("Gemini")
            })?;

        if !response.status().is_success() {
            tracing::warn!("Gemini model listing returned HTTP {}", response.status());
            return Err(DigestError::InvalidApiKey("Gemini"));
        }

        let list: ModelList = response.json().await.map_err(|e| {
            tracing::warn!("Unreadable Gemini model listing: {}", e);
            DigestError::InvalidApiKey("Gemini")
        })?;

        let wanted = format!("models/{}", self.model);
        if list.models.iter().any(|m| m.name == wanted || m.name == self.model) {
            Ok(())
        } else {
            Err(DigestError::ModelUnavailable(self.model.clone()))
        }
    }

    fn build_request(&self, content: &ExtractedContent) -> GenerateRequest {
        let parts = match content {
            ExtractedContent::Transcript(text) => vec![Part::Text {
                text: transcript_message(text),
            }],
            ExtractedContent::VideoBytes {
                bytes,
                mime_type,
                caption,
            } => {
                let mut prompt = SUMMARY_PROMPT.to_string();
                if !caption.trim().is_empty() {
                    prompt.push_str("\n\nThe video was posted with this caption:\n");
                    prompt.push_str(caption);
                }

                vec![
                    Part::Inline {
                        inline_data: InlineData {
                            mime_type: mime_type.to_string(),
                            data: base64::engine::general_purpose::STANDARD.encode(bytes),
                        },
                    },
                    Part::Text { text: prompt },
                ]
            }
        };

        GenerateRequest {
            contents: vec![Content { role: "user", parts }],
            generation_config: GenerationConfig {
                max_output_tokens: self.max_output_tokens,
                temperature: 0.3,
            },
        }
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| DigestError::summarization(None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiErrorBody>(&body)
                .map(|b| match b.error.status {
                    Some(code) => format!("{}: {}", code, b.error.message),
                    None => b.error.message,
                })
                .unwrap_or(body);
            return Err(DigestError::summarization(Some(status.as_u16()), message));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| DigestError::summarization(None, format!("Invalid Gemini response: {e}")))?;

        let candidate = generated.candidates.into_iter().next().ok_or_else(|| {
            let reason = generated
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates returned".to_string());
            DigestError::summarization(None, format!("Gemini returned no summary: {reason}"))
        })?;

        if candidate.finish_reason.as_deref() == Some(FINISH_MAX_TOKENS) {
            return Err(DigestError::ResponseTruncated);
        }

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(DigestError::summarization(
                None,
                format!(
                    "Gemini returned an empty summary (finish reason {})",
                    candidate.finish_reason.as_deref().unwrap_or("unknown")
                ),
            ));
        }

        Ok(text)
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    /// Runs the model listing once per summarizer
    async fn check_ready(&self) -> Result<()> {
        self.model_checked
            .get_or_try_init(|| self.ensure_model_available())
            .await?;
        Ok(())
    }

    async fn summarize(&self, content: &ExtractedContent) -> Result<String> {
        self.check_ready().await?;

        tracing::debug!("Gemini model {}", self.model);
        let request = self.build_request(content);
        let text = self.generate(&request).await?;

        Ok(clean_summary_html(&text))
    }
}
