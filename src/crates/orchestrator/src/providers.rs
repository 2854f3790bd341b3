//! Builds a concrete [`llm::LlmProvider`] from a node's `llm_provider` name
//! and a project-scoped credential lookup (C2).
//!
//! Only the three providers [`crate::credentials::ProviderKind`] knows about
//! are wired up here; adding a fourth is a matter of extending both that
//! enum and the match below.

use std::sync::Arc;

use llm::config::RemoteLlmConfig;
use llm::remote::{ClaudeClient, GeminiClient, OpenAiClient};
use llm::LlmProvider;

use crate::credentials::{resolve_api_key, CredentialStore, ProviderKind};
use crate::error::OrchestratorError;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Resolve `project_id`'s credential for `provider_name` and build the
/// matching [`llm::LlmProvider`] client for `model`.
pub async fn build_provider(
    credentials: &dyn CredentialStore,
    project_id: &str,
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LlmProvider>, OrchestratorError> {
    let api_key = resolve_api_key(credentials, project_id, provider_name).await?;
    let provider = ProviderKind::parse(provider_name)
        .expect("resolve_api_key already validated provider_name against ProviderKind::parse");

    Ok(match provider {
        ProviderKind::OpenAi => {
            let config = RemoteLlmConfig::new(api_key, OPENAI_BASE_URL, model);
            Arc::new(OpenAiClient::new(config)) as Arc<dyn LlmProvider>
        }
        ProviderKind::Anthropic => {
            let config = RemoteLlmConfig::new(api_key, ANTHROPIC_BASE_URL, model);
            Arc::new(ClaudeClient::new(config)) as Arc<dyn LlmProvider>
        }
        ProviderKind::Google => {
            let config = RemoteLlmConfig::new(api_key, GEMINI_BASE_URL, model);
            Arc::new(GeminiClient::new(config)) as Arc<dyn LlmProvider>
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentialStore;

    #[tokio::test]
    async fn builds_a_provider_for_each_known_kind() {
        let store = StaticCredentialStore::new()
            .with_key("proj-1", "openai", "sk-real-looking-key-123")
            .with_key("proj-1", "anthropic", "sk-real-looking-key-456")
            .with_key("proj-1", "google", "sk-real-looking-key-789");

        for name in ["openai", "claude", "gemini"] {
            let provider = build_provider(&store, "proj-1", name, "some-model").await.unwrap();
            assert!(!provider.provider_name().is_empty());
        }
    }

    #[tokio::test]
    async fn surfaces_credential_errors() {
        let store = StaticCredentialStore::new();
        let err = build_provider(&store, "proj-1", "openai", "some-model").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Credential(_)));
    }

    #[tokio::test]
    async fn rejects_unknown_provider_name() {
        let store = StaticCredentialStore::new();
        let err = build_provider(&store, "proj-1", "not-a-provider", "some-model").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Credential(_)));
    }
}
