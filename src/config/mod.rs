use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::summarize::{ApiKeys, Provider};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// API keys; per-request keys only fill the gaps left here
    pub keys: ApiKeys,

    /// LLM provider settings
    pub llm: LlmConfig,

    /// Upstream video/metadata services
    pub sources: SourcesConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider used when the caller does not pick one
    pub default_provider: Option<Provider>,

    pub openai_base_url: String,
    pub openai_model: String,

    /// Output cap for chat completions
    pub openai_max_tokens: u32,

    pub gemini_base_url: String,

    /// Must be present in the key's model listing; there is no fallback model
    pub gemini_model: String,

    pub gemini_max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// YouTube Data API host
    pub youtube_data_api_base: String,

    /// YouTube web host (watch pages, internal player API)
    pub youtube_base: String,

    /// Tweet mirror API host
    pub twitter_mirror_base: String,

    pub mirror_timeout_secs: u64,
    pub download_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory for transcript and summary artifacts
    pub output_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: None,
            openai_base_url: "https://api.openai.com".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            openai_max_tokens: 2000,
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            gemini_model: "gemini-2.5-flash".to_string(),
            gemini_max_output_tokens: 8192,
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            youtube_data_api_base: "https://www.googleapis.com".to_string(),
            youtube_base: "https://www.youtube.com".to_string(),
            twitter_mirror_base: "https://api.fxtwitter.com".to_string(),
            mirror_timeout_secs: 15,
            download_timeout_secs: 60,
        }
    }
}

impl SourcesConfig {
    pub fn mirror_timeout(&self) -> Duration {
        Duration::from_secs(self.mirror_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("digests"),
        }
    }
}

impl Config {
    /// Load configuration from file (defaults when absent), then apply environment overrides
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            serde_yaml::from_str::<Config>(&content)
                .context("Failed to parse config file")?
        } else {
            tracing::debug!("No config file at {}, using defaults", config_path.display());
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("tube-digest").join("config.yaml"))
    }

    /// Apply overrides from an environment-like lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.keys.openai = Some(key);
        }
        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.keys.gemini = Some(key);
        }
        if let Some(key) = lookup("YOUTUBE_API_KEY") {
            self.keys.youtube = Some(key);
        }
        if let Some(provider) = lookup("LLM_PROVIDER") {
            let provider = Provider::from_str(&provider, true)
                .map_err(|_| anyhow::anyhow!("Unknown LLM_PROVIDER: {}", provider))?;
            self.llm.default_provider = Some(provider);
        }
        if let Some(host) = lookup("DIGEST_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("DIGEST_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid DIGEST_PORT: {}", port))?;
        }
        if let Some(dir) = lookup("DIGEST_OUTPUT_DIR") {
            self.app.output_dir = PathBuf::from(dir);
        }

        Ok(())
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.llm.gemini_model.trim().is_empty() {
            anyhow::bail!("llm.gemini_model must be configured");
        }
        if self.llm.openai_model.trim().is_empty() {
            anyhow::bail!("llm.openai_model must be configured");
        }
        if self.sources.mirror_timeout_secs == 0 || self.sources.download_timeout_secs == 0 {
            anyhow::bail!("Source timeouts must be greater than zero");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        let mask = |key: &Option<String>| if key.is_some() { "set" } else { "not set" };

        println!("Current Configuration:");
        println!("  Server: {}:{}", self.server.host, self.server.port);
        println!("  Output Directory: {}", self.app.output_dir.display());
        println!(
            "  Default Provider: {}",
            self.llm
                .default_provider
                .map(|p| p.to_string())
                .unwrap_or_else(|| "auto".to_string())
        );
        println!("  OpenAI Model: {}", self.llm.openai_model);
        println!("  Gemini Model: {}", self.llm.gemini_model);
        println!("  OpenAI API Key: {}", mask(&self.keys.openai));
        println!("  Gemini API Key: {}", mask(&self.keys.gemini));
        println!("  YouTube API Key: {}", mask(&self.keys.youtube));
    }
}
