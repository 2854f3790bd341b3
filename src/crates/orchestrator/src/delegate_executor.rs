//! Runs a single delegate call with timeout and retry (C3).
//!
//! A delegate call is one [`llm::LlmProvider::generate`] invocation wrapped
//! in a per-attempt timeout and a bounded retry loop. Nothing here decides
//! *which* delegate to call or *what* to say to it - [`crate::gcm`] builds
//! the prompt via [`crate::protocol::format_for_delegate`] and hands it in;
//! this module only knows how to get one reliable attempt out of an
//! unreliable network call.

use std::time::Duration;

use graph_core::retry::RetryPolicy;
use llm::LlmProvider;
use serde::{Deserialize, Serialize};

use crate::protocol::{self, Message};

/// Outcome of [`execute_with_retry`]. Mirrors the shape a delegate call
/// reports to its caller regardless of how many attempts it took - a
/// caller never needs to know the attempt history to act on the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateOutcome {
    pub success: bool,
    pub response: String,
    pub status: String,
    pub confidence: f64,
    pub retry_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DelegateOutcome {
    fn from_message(message: Message, retry_count: usize) -> Self {
        match message {
            Message::Response { response, status, confidence, .. } => DelegateOutcome {
                success: true,
                response,
                status: format!("{status:?}").to_lowercase(),
                confidence,
                retry_count,
                error: None,
            },
            other => DelegateOutcome {
                success: true,
                response: protocol::format_for_delegate(&other),
                status: "completed".to_string(),
                confidence: 1.0,
                retry_count,
                error: None,
            },
        }
    }

    fn failure(response: impl Into<String>, error: impl Into<String>, retry_count: usize) -> Self {
        DelegateOutcome {
            success: false,
            response: response.into(),
            status: "error".to_string(),
            confidence: 0.0,
            retry_count,
            error: Some(error.into()),
        }
    }
}

/// `min(2^retry_count, 10)` seconds, matching the source delegate loop's
/// backoff exactly - no jitter, since the source has none here either.
fn backoff_policy(max_retries: usize) -> RetryPolicy {
    RetryPolicy::new(max_retries + 1)
        .with_initial_interval(1.0)
        .with_backoff_factor(2.0)
        .with_max_interval(10.0)
        .with_jitter(false)
}

/// Call `llm_provider` for `prompt`, retrying up to `max_retries` additional
/// times (so `max_retries + 1` attempts total) on timeout or a retryable
/// [`llm::LlmError`], sleeping `min(2^attempt, 10)` seconds before each
/// retry. An empty or `ERROR:`-prefixed completion is treated as a failed
/// attempt even though the transport call itself succeeded, since a
/// delegate reporting its own failure should be retried the same as a
/// dropped connection.
pub async fn execute_with_retry(
    llm_provider: &dyn LlmProvider,
    prompt: &str,
    temperature: f32,
    max_tokens: u32,
    per_attempt_timeout: Duration,
    max_retries: usize,
) -> DelegateOutcome {
    let policy = backoff_policy(max_retries);
    let mut retry_count = 0usize;
    let mut last_error = String::new();

    loop {
        if retry_count > 0 {
            tokio::time::sleep(policy.calculate_delay(retry_count)).await;
        }

        let attempt = tokio::time::timeout(per_attempt_timeout, llm_provider.generate(prompt, temperature, max_tokens)).await;

        match attempt {
            Err(_elapsed) => {
                last_error = format!("Timeout waiting for delegate response (>{}s)", per_attempt_timeout.as_secs());
                if retry_count >= max_retries {
                    return DelegateOutcome::failure(
                        format!("ERROR: Timeout after {} attempts", max_retries + 1),
                        last_error,
                        retry_count,
                    );
                }
            }
            Ok(Err(llm_error)) => {
                last_error = llm_error.to_string();
                if !llm_error.is_retryable() || retry_count >= max_retries {
                    return DelegateOutcome::failure(format!("ERROR: {last_error}"), last_error, retry_count);
                }
            }
            Ok(Ok(response)) => {
                if response.is_failure() {
                    last_error = response.error.unwrap_or_else(|| "empty delegate response".to_string());
                    if retry_count >= max_retries {
                        return DelegateOutcome::failure(format!("ERROR: {last_error}"), last_error, retry_count);
                    }
                } else if response.text.trim_start().starts_with("ERROR:") {
                    last_error = response.text.clone();
                    if retry_count >= max_retries {
                        return DelegateOutcome::failure(response.text, "delegate reported an error", retry_count);
                    }
                } else {
                    let message = protocol::parse_delegate_response(&response.text)
                        .unwrap_or_else(|| Message::response("", "", response.text.clone(), 1.0, None, None));
                    return DelegateOutcome::from_message(message, retry_count);
                }
            }
        }

        retry_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llm::{GenerateResponse, LlmError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedProvider {
        responses: Mutex<Vec<llm::Result<GenerateResponse>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<llm::Result<GenerateResponse>>) -> Self {
            Self { responses: Mutex::new(responses), calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn generate(&self, _prompt: &str, _t: f32, _m: u32) -> llm::Result<GenerateResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(GenerateResponse::ok("fallback", None, 1))
            } else {
                responses.remove(0)
            }
        }
        fn provider_name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let provider = ScriptedProvider::new(vec![Ok(GenerateResponse::ok("the answer", Some(10), 5))]);
        let outcome =
            execute_with_retry(&provider, "prompt", 0.5, 100, Duration::from_secs(5), 2).await;
        assert!(outcome.success);
        assert_eq!(outcome.response, "the answer");
        assert_eq!(outcome.retry_count, 0);
    }

    #[tokio::test]
    async fn retries_on_retryable_error_then_succeeds() {
        let provider = ScriptedProvider::new(vec![
            Err(LlmError::ServiceUnavailable("down".to_string())),
            Ok(GenerateResponse::ok("recovered", None, 5)),
        ]);
        let outcome =
            execute_with_retry(&provider, "prompt", 0.5, 100, Duration::from_secs(5), 2).await;
        assert!(outcome.success);
        assert_eq!(outcome.response, "recovered");
        assert_eq!(outcome.retry_count, 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries_on_non_retryable_error() {
        let provider = ScriptedProvider::new(vec![
            Err(LlmError::AuthenticationError("bad key".to_string())),
        ]);
        let outcome =
            execute_with_retry(&provider, "prompt", 0.5, 100, Duration::from_secs(5), 3).await;
        assert!(!outcome.success);
        assert_eq!(outcome.retry_count, 0);
        assert!(outcome.response.starts_with("ERROR:"));
    }

    #[tokio::test]
    async fn exhausts_retries_on_repeated_empty_responses() {
        let provider = ScriptedProvider::new(vec![
            Ok(GenerateResponse::ok("", None, 1)),
            Ok(GenerateResponse::ok("", None, 1)),
        ]);
        let outcome =
            execute_with_retry(&provider, "prompt", 0.5, 100, Duration::from_secs(5), 1).await;
        assert!(!outcome.success);
        assert_eq!(outcome.retry_count, 1);
    }

    #[tokio::test]
    async fn delegate_reported_error_text_is_treated_as_a_failed_attempt() {
        let provider = ScriptedProvider::new(vec![Ok(GenerateResponse::ok(
            "ERROR: internal delegate failure",
            None,
            1,
        ))]);
        let outcome =
            execute_with_retry(&provider, "prompt", 0.5, 100, Duration::from_secs(5), 0).await;
        assert!(!outcome.success);
        assert_eq!(outcome.retry_count, 0);
    }

    #[tokio::test]
    async fn parses_structured_response_text() {
        let structured = r#"{"type":"response","subquery_id":"q1","delegate_name":"Researcher","response":"parsed answer","status":"completed","confidence":0.88,"metadata":{"timestamp":"2024-01-01T00:00:00Z","message_id":"00000000-0000-0000-0000-000000000000"}}"#;
        let provider = ScriptedProvider::new(vec![Ok(GenerateResponse::ok(structured, None, 1))]);
        let outcome =
            execute_with_retry(&provider, "prompt", 0.5, 100, Duration::from_secs(5), 0).await;
        assert!(outcome.success);
        assert_eq!(outcome.response, "parsed answer");
        assert_eq!(outcome.confidence, 0.88);
    }
}
