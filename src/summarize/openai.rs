use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{clean_summary_html, transcript_message, Provider, Summarizer};
use crate::config::LlmConfig;
use crate::extractors::ExtractedContent;
use crate::{DigestError, Result};

const SYSTEM_MESSAGE: &str =
    "You summarize video transcripts into well-structured HTML fragments.";

/// Text-only backend on the OpenAI chat completions API
pub struct OpenAiSummarizer {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    error: OpenAiError,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
}

impl OpenAiSummarizer {
    pub fn new(client: Client, api_key: impl Into<String>, llm: &LlmConfig) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: llm.openai_base_url.trim_end_matches('/').to_string(),
            model: llm.openai_model.clone(),
            max_tokens: llm.openai_max_tokens,
        }
    }

    async fn send_completion_request(&self, user_content: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_MESSAGE,
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| DigestError::summarization(None, e.to_string()))
            .inspect_err(|e| tracing::error!(error = %e, "Failed to reach OpenAI"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(DigestError::summarization(Some(status.as_u16()), message));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| DigestError::summarization(None, format!("Invalid completion response: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| DigestError::summarization(None, "No content in completion response"))
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    fn provider(&self) -> Provider {
        Provider::Openai
    }

    async fn summarize(&self, content: &ExtractedContent) -> Result<String> {
        let transcript = match content {
            ExtractedContent::Transcript(text) => text,
            ExtractedContent::VideoBytes { .. } => {
                return Err(DigestError::summarization(
                    None,
                    "OpenAI cannot summarize raw video; use Gemini",
                ))
            }
        };

        tracing::debug!("OpenAI model {}, {} transcript chars", self.model, transcript.len());
        let text = self
            .send_completion_request(&transcript_message(transcript))
            .await?;

        Ok(clean_summary_html(&text))
    }
}
