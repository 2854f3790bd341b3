//! Deepseek client implementation.
//!
//! Provides integration with Deepseek's API, including:
//! - Deepseek Chat
//! - Deepseek Coder
//! - Deepseek R1 (thinking model with extended reasoning)
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::remote::DeepseekClient;
//! use llm::config::RemoteLlmConfig;
//! use llm::LlmProvider;
//!
//! let config = RemoteLlmConfig::from_env(
//!     "DEEPSEEK_API_KEY",
//!     "https://api.deepseek.com",
//!     "deepseek-reasoner",
//! )?;
//! let client = DeepseekClient::new(config);
//! let response = client.generate("Solve this puzzle...", 0.3, 1024).await?;
//! ```

use crate::config::RemoteLlmConfig;
use crate::error::{LlmError, Result};
use crate::{timed, GenerateResponse, LlmProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Deepseek API client (OpenAI-compatible).
#[derive(Clone)]
pub struct DeepseekClient {
    config: RemoteLlmConfig,
    client: Client,
}

impl DeepseekClient {
    /// Create a new Deepseek client with the given configuration.
    pub fn new(config: RemoteLlmConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    /// Check if this is a thinking model (R1 series).
    fn is_thinking_model(&self) -> bool {
        self.config.model.contains("reasoner") || self.config.model.contains("r1")
    }

    /// Strip a `<think>...</think>` preamble, returning only the final
    /// answer - the orchestration core has no slot for a separate
    /// reasoning trace, so thinking-model output is collapsed to text
    /// like every other provider's.
    fn strip_reasoning(&self, content: &str) -> String {
        if let (Some(start), Some(end)) = (content.find("<think>"), content.find("</think>")) {
            if end > start {
                return content[end + "</think>".len()..].trim().to_string();
            }
        }
        content.to_string()
    }

    async fn call(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<GenerateResponse> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);

        let req_body = DeepseekRequest {
            model: self.config.model.clone(),
            messages: vec![DeepseekMessage { role: "user".to_string(), content: prompt.to_string() }],
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
                LlmError::ProviderError(format!("Deepseek API error {status}: {error_text}"))
            });
        }

        let deepseek_resp: DeepseekResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = deepseek_resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("empty choices array".into()))?;

        let text = if self.is_thinking_model() {
            self.strip_reasoning(&choice.message.content)
        } else {
            choice.message.content
        };

        Ok(GenerateResponse {
            text,
            error: None,
            token_count: deepseek_resp.usage.map(|u| u.total_tokens as u32),
            response_time_ms: None,
        })
    }
}

#[async_trait]
impl LlmProvider for DeepseekClient {
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<GenerateResponse> {
        let (result, elapsed) = timed(|| self.call(prompt, temperature, max_tokens)).await;
        let mut resp = result?;
        resp.response_time_ms = Some(elapsed);
        Ok(resp)
    }

    fn provider_name(&self) -> &str {
        "deepseek"
    }
}

// Deepseek API types (OpenAI-compatible)
#[derive(Debug, Serialize)]
struct DeepseekRequest {
    model: String,
    messages: Vec<DeepseekMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct DeepseekMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct DeepseekResponse {
    choices: Vec<DeepseekChoice>,
    usage: Option<DeepseekUsage>,
}

#[derive(Debug, Deserialize)]
struct DeepseekChoice {
    message: DeepseekMessage,
}

#[derive(Debug, Deserialize)]
struct DeepseekUsage {
    total_tokens: usize,
}
