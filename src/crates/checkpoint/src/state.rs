//! [`ExecutionState`]: the single persisted record describing one workflow run.
//!
//! Unlike a channel-versioned checkpoint model, an `ExecutionState` is one
//! flat row: the whole of a run's progress lives in `executed_nodes` and
//! `messages_data`, refreshed and merged atomically across a pause/resume
//! boundary by `graph_core::interrupt`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle phase of an [`ExecutionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    AwaitingHumanInput,
    Completed,
    Failed,
    Stopped,
}

/// One entry in the append-only conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEntry {
    /// Strictly increasing within one execution; never reused.
    pub sequence: u64,
    pub node_id: String,
    /// Legacy role label (kept for backward-compatible log rendering);
    /// `agent_name`/`agent_type` carry the structured equivalent.
    pub role: String,
    pub agent_name: String,
    pub agent_type: String,
    pub content: String,
    /// `"agent_output" | "human_input" | "reflection_final" | "system"`.
    pub message_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl MessageEntry {
    pub fn is_reflection_final(&self) -> bool {
        self.message_type == "reflection_final"
    }
}

/// The state a paused `UserProxyAgent` (or a reflection cycle) exposes to
/// the Pause/Resume Controller and, ultimately, to the human caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HumanInputContext {
    pub agent_id: Option<String>,
    pub agent_name: Option<String>,
    #[serde(default)]
    pub input_sources: Vec<String>,
    pub input_count: Option<usize>,
    pub primary_input: Option<String>,
    /// Name of the agent whose output is under review, when this pause is
    /// a reflection cycle rather than a plain `UserProxyAgent` input.
    pub reflection_source: Option<String>,
    pub reflection_source_id: Option<String>,
    /// 1-based; capped by the reflection source's `max_iterations`.
    pub iteration: Option<u32>,
    pub is_deployment: Option<bool>,
    pub input_mode: Option<String>,
}

/// Persisted state for one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    /// Node id -> output text. Append-only while `status == Running`; a
    /// `UserProxyAgent` node may be written more than once across
    /// successive reflection iterations.
    pub executed_nodes: HashMap<String, String>,
    pub messages_data: Vec<MessageEntry>,
    /// Concatenated transcript consumed by downstream prompts.
    #[serde(default)]
    pub conversation_history: String,
    /// Set only while `status == AwaitingHumanInput`.
    pub pending_node: Option<String>,
    #[serde(default)]
    pub human_input_required: bool,
    #[serde(default)]
    pub human_input_context: Option<HumanInputContext>,
    pub human_input_requested_at: Option<DateTime<Utc>>,
    pub human_input_received_at: Option<DateTime<Utc>>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency counter, incremented on every save. Used to
    /// detect (not prevent) a concurrent writer during resume-refresh.
    pub version: u64,
    /// Free-form result payload set once `status == Completed`.
    pub result: Option<Value>,
    pub error: Option<String>,
    /// Distinct agent names observed in `messages_data`, excluding
    /// Start/End markers; set on finalization.
    pub total_agents_involved: Option<usize>,
    /// Node id -> structured delegate conversation payload, written by a
    /// `GroupChatManager` node so the transcript can be replayed in full
    /// even though `executed_nodes` only keeps the flattened text output.
    #[serde(default)]
    pub delegate_conversations: HashMap<String, Value>,
    /// Identifies the workflow graph this run was submitted against, so a
    /// resume can look the graph back up from `execution_id` alone.
    #[serde(default)]
    pub workflow_id: Option<String>,
    /// Credential-scoping namespace used to resolve provider API keys.
    #[serde(default)]
    pub project_id: Option<String>,
}

impl ExecutionState {
    pub fn new(execution_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            execution_id,
            status: ExecutionStatus::Pending,
            executed_nodes: HashMap::new(),
            messages_data: Vec::new(),
            conversation_history: String::new(),
            pending_node: None,
            human_input_required: false,
            human_input_context: None,
            human_input_requested_at: None,
            human_input_received_at: None,
            start_time: now,
            end_time: None,
            duration_seconds: None,
            created_at: now,
            updated_at: now,
            version: 0,
            result: None,
            error: None,
            total_agents_involved: None,
            delegate_conversations: HashMap::new(),
            workflow_id: None,
            project_id: None,
        }
    }

    pub fn next_sequence(&self) -> u64 {
        self.messages_data.last().map(|m| m.sequence + 1).unwrap_or(0)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn push_message(
        &mut self,
        node_id: impl Into<String>,
        agent_name: impl Into<String>,
        agent_type: impl Into<String>,
        content: impl Into<String>,
        message_type: impl Into<String>,
    ) {
        let sequence = self.next_sequence();
        let agent_name = agent_name.into();
        let agent_type = agent_type.into();
        self.messages_data.push(MessageEntry {
            sequence,
            node_id: node_id.into(),
            role: agent_type.clone(),
            agent_name,
            agent_type,
            content: content.into(),
            message_type: message_type.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        });
    }

    /// Whether `messages_data` ends in a reflection-final marker message,
    /// used by the resume-refresh merge rule to prefer the side of a race
    /// that actually recorded the reflection's terminal output.
    pub fn ends_in_reflection_final(&self) -> bool {
        self.messages_data.last().is_some_and(MessageEntry::is_reflection_final)
    }

    /// Distinct agent names in `messages_data`, excluding the Start/End
    /// marker type.
    pub fn count_agents_involved(&self) -> usize {
        self.messages_data
            .iter()
            .filter(|m| m.agent_type != "StartNode" && m.agent_type != "EndNode")
            .map(|m| m.agent_name.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len()
    }

    pub fn finalize(&mut self, status: ExecutionStatus) {
        let now = Utc::now();
        self.status = status;
        self.end_time = Some(now);
        self.duration_seconds = Some((now - self.start_time).num_milliseconds() as f64 / 1000.0);
        self.total_agents_involved = Some(self.count_agents_involved());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_are_monotonic() {
        let mut s = ExecutionState::new(Uuid::new_v4());
        s.push_message("a", "A", "AssistantAgent", "hi", "agent_output");
        s.push_message("b", "B", "AssistantAgent", "there", "agent_output");
        assert_eq!(s.messages_data[0].sequence, 0);
        assert_eq!(s.messages_data[1].sequence, 1);
    }

    #[test]
    fn count_agents_involved_excludes_markers() {
        let mut s = ExecutionState::new(Uuid::new_v4());
        s.push_message("start", "Start", "StartNode", "", "system");
        s.push_message("a", "A", "AssistantAgent", "hi", "agent_output");
        s.push_message("end", "End", "EndNode", "", "system");
        assert_eq!(s.count_agents_involved(), 1);
    }

    #[test]
    fn ends_in_reflection_final_checks_last_message_type() {
        let mut s = ExecutionState::new(Uuid::new_v4());
        s.push_message("a", "A", "AssistantAgent", "draft", "agent_output");
        assert!(!s.ends_in_reflection_final());
        s.push_message("a", "A", "AssistantAgent", "accepted", "reflection_final");
        assert!(s.ends_in_reflection_final());
    }
}
