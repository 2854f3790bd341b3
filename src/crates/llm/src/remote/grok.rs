//! Grok (xAI) client implementation.
//!
//! Provides integration with xAI's Grok models via their API.
//! Grok uses an OpenAI-compatible API format.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::remote::GrokClient;
//! use llm::config::RemoteLlmConfig;
//! use llm::LlmProvider;
//!
//! let config = RemoteLlmConfig::from_env(
//!     "XAI_API_KEY",
//!     "https://api.x.ai/v1",
//!     "grok-beta"
//! )?;
//! let client = GrokClient::new(config);
//! let response = client.generate("Hello!", 0.7, 256).await?;
//! ```

use crate::config::RemoteLlmConfig;
use crate::error::{LlmError, Result};
use crate::{timed, GenerateResponse, LlmProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Grok (xAI) API client.
#[derive(Clone)]
pub struct GrokClient {
    config: RemoteLlmConfig,
    client: Client,
}

impl GrokClient {
    /// Create a new Grok client with the given configuration.
    pub fn new(config: RemoteLlmConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    async fn call(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<GenerateResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let req_body = GrokRequest {
            model: self.config.model.clone(),
            messages: vec![GrokMessage { role: "user".to_string(), content: prompt.to_string() }],
            temperature: Some(temperature),
            max_tokens: Some(max_tokens as usize),
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&req_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            return Err(if status.as_u16() == 401 {
                LlmError::AuthenticationError(error_text)
            } else if status.as_u16() == 429 {
                LlmError::RateLimitExceeded(error_text)
            } else {
                LlmError::ProviderError(format!("Grok API error {status}: {error_text}"))
            });
        }

        let grok_resp: GrokResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = grok_resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("empty choices array".into()))?;

        Ok(GenerateResponse {
            text: choice.message.content,
            error: None,
            token_count: grok_resp.usage.map(|u| u.total_tokens as u32),
            response_time_ms: None,
        })
    }
}

#[async_trait]
impl LlmProvider for GrokClient {
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<GenerateResponse> {
        let (result, elapsed) = timed(|| self.call(prompt, temperature, max_tokens)).await;
        let mut resp = result?;
        resp.response_time_ms = Some(elapsed);
        Ok(resp)
    }

    fn provider_name(&self) -> &str {
        "grok"
    }
}

// Grok API types (OpenAI-compatible)
#[derive(Debug, Serialize)]
struct GrokRequest {
    model: String,
    messages: Vec<GrokMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct GrokMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct GrokResponse {
    choices: Vec<GrokChoice>,
    usage: Option<GrokUsage>,
}

#[derive(Debug, Deserialize)]
struct GrokChoice {
    message: GrokMessage,
}

#[derive(Debug, Deserialize)]
struct GrokUsage {
    total_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = RemoteLlmConfig::new("test-key", "https://api.x.ai/v1", "grok-beta");
        let _client = GrokClient::new(config);
    }

    #[test]
    fn provider_name_is_grok() {
        let config = RemoteLlmConfig::new("test-key", "https://api.x.ai/v1", "grok-beta");
        let client = GrokClient::new(config);
        assert_eq!(client.provider_name(), "grok");
    }
}
