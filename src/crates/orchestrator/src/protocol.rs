//! Structured message passing between a [`crate::gcm`] and its delegates.
//!
//! A delegate sees only [`format_for_delegate`]'s human-readable rendering of
//! a [`Message::Delegation`] - never the JSON itself. A delegate's *reply*,
//! by contrast, is free text that may or may not contain a JSON object; use
//! [`parse_delegate_response`] to recover structure from it, falling back to
//! a plain [`Message::Response`] when none is found.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Accepted,
    Rejected,
    RequiresClarification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Completed,
    InProgress,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationContext {
    pub original_input: String,
    #[serde(default)]
    pub related_subqueries: Vec<String>,
    pub iteration: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub timestamp: DateTime<Utc>,
    pub message_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegation_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

impl MessageMetadata {
    fn stamp() -> Self {
        Self {
            timestamp: Utc::now(),
            message_id: Uuid::new_v4(),
            delegation_confidence: None,
            tokens_used: None,
            response_time_ms: None,
        }
    }
}

/// One message in the delegation protocol. `type` discriminates on the wire,
/// matching the four kinds the original delegation protocol defines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Delegation {
        subquery_id: String,
        subquery: String,
        priority: Priority,
        context: DelegationContext,
        metadata: MessageMetadata,
    },
    Acknowledgment {
        subquery_id: String,
        delegate_name: String,
        status: AckStatus,
        #[serde(default)]
        message: String,
        metadata: MessageMetadata,
    },
    Response {
        subquery_id: String,
        delegate_name: String,
        response: String,
        status: ResponseStatus,
        confidence: f64,
        metadata: MessageMetadata,
        /// Set when this `Response` was synthesized from unstructured text
        /// rather than parsed from a JSON payload the delegate returned.
        #[serde(default)]
        parsed_from_text: bool,
    },
    Error {
        subquery_id: String,
        delegate_name: String,
        error_type: String,
        error_message: String,
        retryable: bool,
        metadata: MessageMetadata,
    },
}

impl Message {
    pub fn delegation(
        subquery_id: impl Into<String>,
        subquery: impl Into<String>,
        priority: Priority,
        original_input: impl Into<String>,
        related_subqueries: Vec<String>,
        iteration: u32,
        delegation_confidence: f64,
    ) -> Self {
        let mut metadata = MessageMetadata::stamp();
        metadata.delegation_confidence = Some(delegation_confidence);
        Message::Delegation {
            subquery_id: subquery_id.into(),
            subquery: subquery.into(),
            priority,
            context: DelegationContext {
                original_input: original_input.into(),
                related_subqueries,
                iteration,
            },
            metadata,
        }
    }

    pub fn response(
        subquery_id: impl Into<String>,
        delegate_name: impl Into<String>,
        response: impl Into<String>,
        confidence: f64,
        tokens_used: Option<u32>,
        response_time_ms: Option<u64>,
    ) -> Self {
        let mut metadata = MessageMetadata::stamp();
        metadata.tokens_used = tokens_used;
        metadata.response_time_ms = response_time_ms;
        Message::Response {
            subquery_id: subquery_id.into(),
            delegate_name: delegate_name.into(),
            response: response.into(),
            status: ResponseStatus::Completed,
            confidence,
            metadata,
            parsed_from_text: false,
        }
    }

    pub fn error(
        subquery_id: impl Into<String>,
        delegate_name: impl Into<String>,
        error_type: impl Into<String>,
        error_message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Message::Error {
            subquery_id: subquery_id.into(),
            delegate_name: delegate_name.into(),
            error_type: error_type.into(),
            error_message: error_message.into(),
            retryable,
            metadata: MessageMetadata::stamp(),
        }
    }

    pub fn subquery_id(&self) -> &str {
        match self {
            Message::Delegation { subquery_id, .. }
            | Message::Acknowledgment { subquery_id, .. }
            | Message::Response { subquery_id, .. }
            | Message::Error { subquery_id, .. } => subquery_id,
        }
    }
}

/// Recover a [`Message`] from a delegate's free-text reply. The delegate is
/// an LLM completion, not a protocol-aware client, so its output is scanned
/// for a `{ ... }` span between the first `{` and the last `}`; if that
/// parses as JSON carrying a `type` field it is treated as a structured
/// message, otherwise (no braces, invalid JSON, or no `type` field) the
/// whole text becomes a plain [`Message::Response`] with `parsed_from_text`
/// set so callers can tell the two cases apart.
pub fn parse_delegate_response(response_text: &str) -> Option<Message> {
    let trimmed = response_text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end >= start {
            let candidate = &trimmed[start..=end];
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
                if value.get("type").is_some() {
                    if let Ok(message) = serde_json::from_value::<Message>(value) {
                        return Some(message);
                    }
                }
            }
        }
    }

    Some(Message::Response {
        subquery_id: String::new(),
        delegate_name: String::new(),
        response: trimmed.to_string(),
        status: ResponseStatus::Completed,
        confidence: 1.0,
        metadata: MessageMetadata::stamp(),
        parsed_from_text: true,
    })
}

/// Render a message the way a delegate should see it. A `Delegation` is
/// rendered as plain instructions (delegates are prompted with text, not
/// asked to parse JSON); every other kind falls back to pretty-printed JSON,
/// which in practice only matters for logging since delegates never receive
/// anything but delegation requests.
pub fn format_for_delegate(message: &Message) -> String {
    match message {
        Message::Delegation { subquery_id, subquery, priority, context, .. } => {
            let priority_label = match priority {
                Priority::High => "HIGH",
                Priority::Medium => "MEDIUM",
                Priority::Low => "LOW",
            };
            format!(
                "=== DELEGATION REQUEST ===\n\n\
                 Subquery ID: {subquery_id}\n\
                 Priority: {priority_label}\n\n\
                 Task:\n{subquery}\n\n\
                 Context:\n\
                 - Original Input: {original_input}\n\
                 - Related Subqueries: {related_count} related\n\
                 - Iteration: {iteration}\n\n\
                 Please process this subquery and provide your response.\n",
                original_input = context.original_input,
                related_count = context.related_subqueries.len(),
                iteration = context.iteration,
            )
        }
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_structured_response_from_surrounding_prose() {
        let text = r#"Sure, here you go: {"type":"response","subquery_id":"q1","delegate_name":"Researcher","response":"done","status":"completed","confidence":0.9,"metadata":{"timestamp":"2024-01-01T00:00:00Z","message_id":"00000000-0000-0000-0000-000000000000"}} thanks"#;
        let parsed = parse_delegate_response(text).unwrap();
        match parsed {
            Message::Response { subquery_id, parsed_from_text, .. } => {
                assert_eq!(subquery_id, "q1");
                assert!(!parsed_from_text);
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_plain_response_for_unstructured_text() {
        let parsed = parse_delegate_response("just a plain answer").unwrap();
        match parsed {
            Message::Response { response, parsed_from_text, .. } => {
                assert_eq!(response, "just a plain answer");
                assert!(parsed_from_text);
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_plain_response_when_braces_dont_contain_json() {
        let parsed = parse_delegate_response("result: {not json}").unwrap();
        match parsed {
            Message::Response { parsed_from_text, .. } => assert!(parsed_from_text),
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn empty_text_yields_no_message() {
        assert!(parse_delegate_response("   ").is_none());
    }

    #[test]
    fn formats_delegation_as_human_readable_request() {
        let msg = Message::delegation("q1", "Summarize the report", Priority::High, "original", vec![], 1, 0.8);
        let rendered = format_for_delegate(&msg);
        assert!(rendered.contains("=== DELEGATION REQUEST ==="));
        assert!(rendered.contains("Priority: HIGH"));
        assert!(rendered.contains("Summarize the report"));
    }
}
