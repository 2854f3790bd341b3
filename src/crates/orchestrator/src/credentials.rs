//! Per-project, encrypted API-key lookup for LLM providers.
//!
//! A workflow never reads secrets from the process environment: every
//! credential lookup is scoped to the project the workflow belongs to, and
//! a missing or placeholder-looking key fails the node fast rather than
//! silently falling back to an unauthenticated client.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
}

impl ProviderKind {
    /// Accepts the same aliases the source agent configs use
    /// (`anthropic`/`claude`, `google`/`gemini`) alongside the canonical name.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "openai" => Some(ProviderKind::OpenAi),
            "anthropic" | "claude" => Some(ProviderKind::Anthropic),
            "google" | "gemini" => Some(ProviderKind::Google),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("unknown provider type: {0}")]
    UnknownProvider(String),
    #[error("no {provider} API key configured for project {project_id}")]
    NotFound { project_id: String, provider: String },
    #[error("API key for {provider} in project {project_id} looks like a placeholder value")]
    Placeholder { project_id: String, provider: String },
    #[error("credential store error: {0}")]
    Backend(String),
}

/// Looks up an encrypted, project-scoped API key. Implementations are
/// read-only for the lifetime of a workflow run - credentials are resolved
/// once per delegate-executor call, never cached across runs.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_api_key(&self, project_id: &str, provider: ProviderKind) -> Option<String>;
}

/// Substrings that mark an otherwise-present key as a placeholder rather
/// than a real secret, plus the length floor below which no real provider
/// key is valid. Kept as one list rather than the two slightly different
/// ones the Python services used, since there's no reason a key caught by
/// one check should pass the other.
const PLACEHOLDER_MARKERS: &[&str] = &["your_", "placeholder", "replace", "example", "dummy"];
const MIN_KEY_LENGTH: usize = 10;

fn looks_like_placeholder(key: &str) -> bool {
    let lower = key.to_lowercase();
    PLACEHOLDER_MARKERS.iter().any(|marker| lower.contains(marker)) || key.trim().len() < MIN_KEY_LENGTH
}

/// Resolve and validate an API key for `provider` in `project_id`, rejecting
/// both an absent key and one that looks like a placeholder.
pub async fn resolve_api_key(
    store: &dyn CredentialStore,
    project_id: &str,
    provider_name: &str,
) -> Result<String, CredentialError> {
    let provider = ProviderKind::parse(provider_name)
        .ok_or_else(|| CredentialError::UnknownProvider(provider_name.to_string()))?;

    let key = store.get_api_key(project_id, provider).await.ok_or_else(|| CredentialError::NotFound {
        project_id: project_id.to_string(),
        provider: provider_name.to_string(),
    })?;

    if looks_like_placeholder(&key) {
        return Err(CredentialError::Placeholder {
            project_id: project_id.to_string(),
            provider: provider_name.to_string(),
        });
    }

    Ok(key)
}

/// An in-memory [`CredentialStore`] keyed by `(project_id, provider)`, used
/// in tests and for single-project deployments configured at startup.
pub struct StaticCredentialStore {
    keys: std::collections::HashMap<(String, String), String>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self { keys: std::collections::HashMap::new() }
    }

    pub fn with_key(mut self, project_id: impl Into<String>, provider: &str, key: impl Into<String>) -> Self {
        self.keys.insert((project_id.into(), provider.to_string()), key.into());
        self
    }
}

impl Default for StaticCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn get_api_key(&self, project_id: &str, provider: ProviderKind) -> Option<String> {
        let provider_key = match provider {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
        };
        self.keys.get(&(project_id.to_string(), provider_key.to_string())).cloned()
    }
}

/// A [`CredentialStore`] backed by process environment variables, used by
/// the server binary for single-tenant deployments where keys are supplied
/// at process start rather than through a real encrypted, multi-project
/// secret store. Looks up `{PROJECT_ID}_{PROVIDER}_API_KEY` first (both
/// upper-cased, non-alphanumeric replaced with `_`), falling back to the
/// project-independent `{PROVIDER}_API_KEY`.
pub struct EnvCredentialStore;

impl EnvCredentialStore {
    fn sanitize(raw: &str) -> String {
        raw.chars().map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' }).collect()
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn get_api_key(&self, project_id: &str, provider: ProviderKind) -> Option<String> {
        let provider_key = match provider {
            ProviderKind::OpenAi => "OPENAI",
            ProviderKind::Anthropic => "ANTHROPIC",
            ProviderKind::Google => "GOOGLE",
        };
        let scoped = format!("{}_{}_API_KEY", Self::sanitize(project_id), provider_key);
        std::env::var(&scoped).ok().or_else(|| std::env::var(format!("{provider_key}_API_KEY")).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_a_valid_key() {
        let store = StaticCredentialStore::new().with_key("proj-1", "openai", "sk-real-looking-key-123");
        let key = resolve_api_key(&store, "proj-1", "openai").await.unwrap();
        assert_eq!(key, "sk-real-looking-key-123");
    }

    #[tokio::test]
    async fn rejects_placeholder_keys() {
        let store = StaticCredentialStore::new().with_key("proj-1", "openai", "your_api_key_here");
        let err = resolve_api_key(&store, "proj-1", "openai").await.unwrap_err();
        assert!(matches!(err, CredentialError::Placeholder { .. }));
    }

    #[tokio::test]
    async fn rejects_short_keys() {
        let store = StaticCredentialStore::new().with_key("proj-1", "openai", "short");
        let err = resolve_api_key(&store, "proj-1", "openai").await.unwrap_err();
        assert!(matches!(err, CredentialError::Placeholder { .. }));
    }

    #[tokio::test]
    async fn reports_missing_key() {
        let store = StaticCredentialStore::new();
        let err = resolve_api_key(&store, "proj-1", "openai").await.unwrap_err();
        assert!(matches!(err, CredentialError::NotFound { .. }));
    }

    #[tokio::test]
    async fn rejects_unknown_provider() {
        let store = StaticCredentialStore::new();
        let err = resolve_api_key(&store, "proj-1", "unknown-vendor").await.unwrap_err();
        assert!(matches!(err, CredentialError::UnknownProvider(_)));
    }

    #[tokio::test]
    async fn env_store_prefers_project_scoped_key_over_global() {
        std::env::set_var("CREDTEST_OPENAI_API_KEY", "scoped-key");
        std::env::set_var("OPENAI_API_KEY", "global-key");
        let store = EnvCredentialStore;
        let key = store.get_api_key("credtest", ProviderKind::OpenAi).await;
        assert_eq!(key.as_deref(), Some("scoped-key"));
        std::env::remove_var("CREDTEST_OPENAI_API_KEY");
        std::env::remove_var("OPENAI_API_KEY");
    }

    #[tokio::test]
    async fn env_store_falls_back_to_global_key() {
        std::env::remove_var("CREDTEST2_ANTHROPIC_API_KEY");
        std::env::set_var("ANTHROPIC_API_KEY", "global-anthropic-key");
        let store = EnvCredentialStore;
        let key = store.get_api_key("credtest2", ProviderKind::Anthropic).await;
        assert_eq!(key.as_deref(), Some("global-anthropic-key"));
        std::env::remove_var("ANTHROPIC_API_KEY");
    }

    #[test]
    fn parses_provider_aliases() {
        assert_eq!(ProviderKind::parse("claude"), Some(ProviderKind::Anthropic));
        assert_eq!(ProviderKind::parse("gemini"), Some(ProviderKind::Google));
        assert_eq!(ProviderKind::parse("openai"), Some(ProviderKind::OpenAi));
    }
}
