//! OpenAI-compatible chat-completions backend for the [`Analyzer`] trait.
//!
//! Works against any endpoint speaking the `/chat/completions` protocol
//! (OpenAI, DeepSeek, a local server). The model is asked for a strict JSON
//! object; anything else comes back as [`AnalyzerError::Malformed`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analyzer::{build_prompt, Analysis, Analyzer};
use crate::config::AnalyzerConfig;
use crate::error::AnalyzerError;
use crate::memory::types::MemoryRecord;

const SYSTEM_PROMPT: &str =
    "You are an expert e-commerce product analyst. You answer only in strict JSON.";

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct OpenAiAnalyzer {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f64,
}

impl OpenAiAnalyzer {
    /// Build from config. The API key is read from the configured
    /// environment variable and is required.
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("analyzer API key env var {} not set", config.api_key_env))?;

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }

    fn map_send_error(e: reqwest::Error) -> AnalyzerError {
        if e.is_timeout() {
            AnalyzerError::Timeout
        } else {
            AnalyzerError::Http(e.to_string())
        }
    }
}

/// Parse the model's answer into an [`Analysis`].
///
/// Tolerates a fenced code block around the JSON, nothing more.
fn parse_analysis(content: &str) -> Result<Analysis, AnalyzerError> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(trimmed).map_err(|e| AnalyzerError::Malformed(e.to_string()))
}

#[async_trait]
impl Analyzer for OpenAiAnalyzer {
    async fn analyze(
        &self,
        query: &str,
        context: Option<&MemoryRecord>,
    ) -> Result<Analysis, AnalyzerError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_prompt(query, context),
                },
            ],
            temperature: self.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, with_context = context.is_some(), "calling analyzer");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AnalyzerError::RateLimited);
        }
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(AnalyzerError::Http(format!("{status}: {body_text}")));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnalyzerError::Malformed(e.to_string()))?;

        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AnalyzerError::Malformed("no choices in response".to_string()))?;

        parse_analysis(&choice.message.content)
    }
}
