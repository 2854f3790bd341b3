//! OpenAI client implementation.
//!
//! Provides integration with OpenAI's API, supporting models like:
//! - GPT-4, GPT-4 Turbo
//! - GPT-3.5 Turbo
//! - o1, o1-mini (thinking models)
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::remote::OpenAiClient;
//! use llm::config::RemoteLlmConfig;
//! use llm::LlmProvider;
//!
//! let config = RemoteLlmConfig::from_env(
//!     "OPENAI_API_KEY",
//!     "https://api.openai.com/v1",
//!     "gpt-4"
//! )?;
//! let client = OpenAiClient::new(config);
//! let response = client.generate("Hello!", 0.7, 256).await?;
//! ```

use crate::config::RemoteLlmConfig;
use crate::error::{LlmError, Result};
use crate::{timed, GenerateResponse, LlmProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// OpenAI API client.
#[derive(Clone)]
pub struct OpenAiClient {
    config: RemoteLlmConfig,
    client: Client,
}

impl OpenAiClient {
    /// Create a new OpenAI client with the given configuration.
    pub fn new(config: RemoteLlmConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    /// o1 / o1-mini interleave a `<think>...</think>` reasoning block
    /// ahead of the answer; strip it since there's no slot to carry it.
    fn strip_reasoning(&self, content: &str) -> String {
        if self.config.model.starts_with("o1") {
            if let Some(end) = content.find("</think>") {
                return content[end + "</think>".len()..].trim().to_string();
            }
        }
        content.to_string()
    }

    async fn call(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<GenerateResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let req_body = OpenAiRequest {
            model: self.config.model.clone(),
            messages: vec![OpenAiMessage { role: "user".to_string(), content: prompt.to_string() }],
            temperature: Some(temperature),
            max_tokens: Some(max_tokens as usize),
            stream: false,
        };

        let mut req = self.client.post(&url).json(&req_body);
        req = req.header("Authorization", format!("Bearer {}", self.config.api_key));
        if let Some(org) = &self.config.organization {
            req = req.header("OpenAI-Organization", org);
        }

        let response = req.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            return Err(if status.as_u16() == 401 {
                LlmError::AuthenticationError(error_text)
            } else if status.as_u16() == 429 {
                LlmError::RateLimitExceeded(error_text)
            } else {
                LlmError::ProviderError(format!("OpenAI API error {status}: {error_text}"))
            });
        }

        let openai_resp: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = openai_resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("empty choices array".into()))?;

        let text = self.strip_reasoning(&choice.message.content.unwrap_or_default());

        Ok(GenerateResponse {
            text,
            error: None,
            token_count: openai_resp.usage.map(|u| u.total_tokens as u32),
            response_time_ms: None,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiClient {
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<GenerateResponse> {
        let (result, elapsed) = timed(|| self.call(prompt, temperature, max_tokens)).await;
        let mut resp = result?;
        resp.response_time_ms = Some(elapsed);
        Ok(resp)
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    total_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = RemoteLlmConfig::new("test-key", "https://api.openai.com/v1", "gpt-4");
        let _client = OpenAiClient::new(config);
    }

    #[test]
    fn test_strip_reasoning_leaves_non_thinking_models_untouched() {
        let config = RemoteLlmConfig::new("test-key", "https://api.openai.com/v1", "gpt-4");
        let client = OpenAiClient::new(config);
        assert_eq!(client.strip_reasoning("plain answer"), "plain answer");
    }

    #[test]
    fn test_strip_reasoning_strips_think_block_for_o1() {
        let config = RemoteLlmConfig::new("test-key", "https://api.openai.com/v1", "o1-mini");
        let client = OpenAiClient::new(config);
        let content = "<think>pondering...</think>42";
        assert_eq!(client.strip_reasoning(content), "42");
    }
}
