//! LLM provider implementations for the agent workflow orchestrator.
//!
//! This crate is the orchestrator's one external-LLM boundary: a single
//! narrow trait, [`LlmProvider`], implemented by each concrete vendor. The
//! core never sees vendor-specific message formats, tool-call schemas, or
//! streaming protocols - it calls `generate(prompt, temperature,
//! max_tokens)` and gets back text, optionally an error, token usage, and
//! latency. Concrete wire formats live entirely inside each provider
//! module and are opaque to everything above this crate.
//!
//! # Local Providers
//!
//! Local providers connect to LLM servers running on localhost or local network:
//! - **Ollama** - Popular local LLM runner with wide model support
//! - **llama.cpp** - Direct llama.cpp server integration
//! - **LM Studio** - User-friendly local LLM interface
//!
//! # Remote Providers
//!
//! Remote providers connect to cloud-hosted LLM APIs:
//! - **Claude** - Anthropic's Claude models
//! - **OpenAI** - OpenAI models (GPT-4, o1, etc.)
//! - **Gemini** - Google's Gemini models
//! - **Grok** - xAI's Grok models
//! - **Deepseek** - Deepseek models including R1 (thinking model)
//! - **OpenRouter** - Unified API for multiple providers
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::remote::OpenAiClient;
//! use llm::config::RemoteLlmConfig;
//! use llm::LlmProvider;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RemoteLlmConfig::from_env(
//!         "OPENAI_API_KEY",
//!         "https://api.openai.com/v1",
//!         "gpt-4",
//!     )?;
//!     let client = OpenAiClient::new(config);
//!     let response = client.generate("What is Rust?", 0.7, 512).await?;
//!     println!("{}", response.text);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod provider_utils;

#[macro_use]
mod provider_macros;

#[cfg(feature = "local")]
pub mod local;

#[cfg(feature = "remote")]
pub mod remote;

use async_trait::async_trait;
use std::time::Instant;

pub use config::{LocalLlmConfig, RemoteLlmConfig};
pub use error::{LlmError, Result};
pub use provider_utils::{ModelInfo, ProviderUtils};

/// Result of a single completion call, mirroring the external LLM
/// provider contract this workspace consumes (`generate(prompt,
/// temperature, max_tokens) -> {text, error, tokens, latency_ms}`).
///
/// A provider returns `Err` only for a transport-level failure (the HTTP
/// call itself could not be made or its response could not be parsed at
/// all); anything the vendor reports as a semantic failure - content
/// filtering, an empty completion, an auth error surfaced in the response
/// body - is carried in `error` so the caller can distinguish retryable
/// transport failures from provider-reported ones without inspecting
/// error strings.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct GenerateResponse {
    pub text: String,
    pub error: Option<String>,
    pub token_count: Option<u32>,
    pub response_time_ms: Option<u64>,
}

impl GenerateResponse {
    pub fn ok(text: impl Into<String>, token_count: Option<u32>, response_time_ms: u64) -> Self {
        Self {
            text: text.into(),
            error: None,
            token_count,
            response_time_ms: Some(response_time_ms),
        }
    }

    pub fn failed(error: impl Into<String>, response_time_ms: u64) -> Self {
        Self {
            text: String::new(),
            error: Some(error.into()),
            token_count: None,
            response_time_ms: Some(response_time_ms),
        }
    }

    /// Both an explicit provider error and an empty completion count as
    /// failure - the core never distinguishes "vendor said no" from
    /// "vendor said nothing".
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || self.text.is_empty()
    }
}

/// The single boundary the orchestration core calls through to reach any
/// LLM vendor. Implementations are stateless HTTP clients - no session or
/// conversation state is held between calls, since every call here is a
/// one-shot completion over a fully-formed prompt string built upstream
/// by `orchestrator`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion for `prompt`. Transport failures (connection
    /// refused, malformed response body) return `Err`; everything else -
    /// including provider-reported errors - is folded into the returned
    /// [`GenerateResponse`].
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<GenerateResponse>;

    /// Vendor/model identifier used in logs and metrics.
    fn provider_name(&self) -> &str;
}

/// Times an async generate call and stamps the result with elapsed
/// milliseconds, so providers don't each reimplement the same
/// `Instant::now()` bookkeeping.
pub(crate) async fn timed<F, Fut>(f: F) -> (Result<GenerateResponse>, u64)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<GenerateResponse>>,
{
    let start = Instant::now();
    let result = f().await;
    let elapsed = start.elapsed().as_millis() as u64;
    (result, elapsed)
}
