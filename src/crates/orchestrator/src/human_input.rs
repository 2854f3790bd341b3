//! Pause/resume controller (C6): the boundary between a paused
//! `UserProxyAgent` and the human caller who unblocks it.
//!
//! [`handle_scheduler_pause`] runs right after [`graph_core::scheduler::Scheduler::run`]
//! returns with `status == AwaitingHumanInput`; [`resume`] is the REST
//! `POST /human-input/submit` handler's core logic.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use graph_core::graph::{EdgeType, Graph};
use graph_core::scheduler::Scheduler;
use graph_core::state::{ExecutionState, HumanInputContext};
use graph_core::{interrupt, ExecutionStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context;
use crate::error::OrchestratorError;
use checkpoint::{CheckpointError, ExecutionStore};

/// Records that human input was received, independent of where it's stored
/// - a SQLite-backed audit table in production, nothing at all in tests.
#[async_trait]
pub trait HumanInputAuditLog: Send + Sync {
    async fn record(&self, execution_id: Uuid, human_input: &str, action: &str) -> Result<(), OrchestratorError>;
}

/// Audit log that records nothing - for in-memory deployments and tests
/// where a SQLite-backed store isn't wired up.
pub struct NullAuditLog;

#[async_trait]
impl HumanInputAuditLog for NullAuditLog {
    async fn record(&self, _execution_id: Uuid, _human_input: &str, _action: &str) -> Result<(), OrchestratorError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeAction {
    Submit,
    Iterate,
}

#[derive(Debug, Clone)]
pub struct ResumeRequest {
    pub execution_id: Uuid,
    pub human_input: String,
    pub action: ResumeAction,
}

/// Set `state`'s pause fields and persist, after refreshing against
/// whatever's currently stored (see [`interrupt::merge_executed_nodes`]).
pub async fn pause_with_context(
    store: &dyn ExecutionStore,
    state: &mut ExecutionState,
    node_id: &str,
    context: HumanInputContext,
) -> Result<(), OrchestratorError> {
    state.status = ExecutionStatus::AwaitingHumanInput;
    state.pending_node = Some(node_id.to_string());
    state.human_input_required = true;
    state.human_input_context = Some(context);
    state.human_input_requested_at = Some(Utc::now());
    store.save(state).await?;
    Ok(())
}

/// Called right after [`Scheduler::run`] returns with a pending node: merges
/// in whatever another writer may have already persisted, then builds the
/// [`HumanInputContext`] the human caller will see. Detects a reflection
/// cycle (an incoming [`EdgeType::Reflection`] edge into the paused node)
/// and seeds `reflection_source`/`reflection_source_id`/`iteration` so
/// [`resume`] knows to hand off to [`crate::reflection`] rather than
/// continuing the scheduler directly.
pub async fn handle_scheduler_pause(
    store: &dyn ExecutionStore,
    graph: &Graph,
    state: &mut ExecutionState,
) -> Result<(), OrchestratorError> {
    let node_id = state
        .pending_node
        .clone()
        .ok_or_else(|| OrchestratorError::Scheduling("scheduler paused without a pending_node".into()))?;

    if let Some(stored) = store.load(state.execution_id).await? {
        let merged_messages = interrupt::merge_messages_data(&stored, state);
        let local_nodes = std::mem::take(&mut state.executed_nodes);
        state.executed_nodes = interrupt::merge_executed_nodes(stored.executed_nodes, local_nodes);
        state.messages_data = merged_messages;
    }

    let node = graph
        .node(&node_id)
        .ok_or_else(|| OrchestratorError::Configuration(format!("unknown node '{node_id}'")))?;
    let aggregated = context::aggregate(graph, &node_id, state);

    let reflection_source_id = graph
        .edges
        .iter()
        .find(|e| e.target == node_id && e.edge_type == EdgeType::Reflection)
        .map(|e| e.source.clone());
    let reflection_source = reflection_source_id
        .as_ref()
        .and_then(|id| graph.node(id))
        .and_then(|n| n.data.name.clone())
        .or_else(|| reflection_source_id.clone());

    let context = HumanInputContext {
        agent_id: Some(node_id.clone()),
        agent_name: node.data.name.clone().or_else(|| Some(node_id.clone())),
        input_sources: graph.dependencies_of(&node_id).into_iter().cloned().collect(),
        input_count: Some(aggregated.input_count),
        primary_input: Some(aggregated.primary_input),
        reflection_source,
        reflection_source_id,
        iteration: None,
        is_deployment: Some(false),
        input_mode: Some("text".to_string()),
    };
    let iteration = if context.reflection_source_id.is_some() { Some(1) } else { None };
    let context = HumanInputContext { iteration, ..context };

    pause_with_context(store, state, &node_id, context).await
}

/// Whether `node_id` has an outgoing edge (sequential or reflection) that
/// depends on its output - if so, the human input must be written to
/// `executed_nodes` for the scheduler to pick up on resume.
fn has_outgoing_dependency_edge(graph: &Graph, node_id: &str) -> bool {
    !graph.successors(node_id, EdgeType::Sequential).is_empty() || !graph.successors(node_id, EdgeType::Reflection).is_empty()
}

/// `POST /human-input/submit`'s core logic: claim the paused execution,
/// record the audit entry, append
/// the human's input to the transcript, route it into `executed_nodes` if
/// downstream nodes depend on it, then either hand off to
/// [`crate::reflection`] or continue the scheduler.
#[allow(clippy::too_many_arguments)]
pub async fn resume(
    store: &dyn ExecutionStore,
    graph: &Graph,
    scheduler: &Scheduler,
    audit: &dyn HumanInputAuditLog,
    reflect: impl FnOnce(
        &dyn ExecutionStore,
        &Graph,
        &Scheduler,
        ExecutionState,
        &str,
        ResumeAction,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ExecutionState, OrchestratorError>> + Send + '_>>,
    request: ResumeRequest,
) -> Result<ExecutionState, OrchestratorError> {
    let mut state = match store.try_claim_resume(request.execution_id).await {
        Ok(state) => state,
        Err(CheckpointError::NotAwaitingInput(_)) => {
            let loaded = store
                .load(request.execution_id)
                .await?
                .ok_or_else(|| OrchestratorError::Configuration(format!("execution {} not found", request.execution_id)))?;
            if matches!(loaded.status, ExecutionStatus::Running | ExecutionStatus::Pending) {
                loaded
            } else {
                return Err(OrchestratorError::Configuration(format!(
                    "execution {} is not awaiting human input",
                    request.execution_id
                )));
            }
        }
        Err(e) => return Err(e.into()),
    };

    let action_label = match request.action {
        ResumeAction::Submit => "submit",
        ResumeAction::Iterate => "iterate",
    };
    audit.record(request.execution_id, &request.human_input, action_label).await?;

    let node_id = state
        .pending_node
        .clone()
        .ok_or_else(|| OrchestratorError::Scheduling("resumed execution has no pending_node".into()))?;
    let node = graph.node(&node_id);
    let agent_name = node.and_then(|n| n.data.name.clone()).unwrap_or_else(|| node_id.clone());

    state.human_input_required = false;
    state.human_input_received_at = Some(Utc::now());
    state.conversation_history.push_str(&format!("{agent_name}: {}\n", request.human_input));
    state.push_message(node_id.clone(), agent_name, "UserProxyAgent", request.human_input.clone(), "human_input");

    if has_outgoing_dependency_edge(graph, &node_id) {
        state.executed_nodes.insert(node_id.clone(), request.human_input.clone());
    }
    store.save(&state).await?;

    let reflection_source_id = state.human_input_context.as_ref().and_then(|c| c.reflection_source_id.clone());

    if let Some(source_id) = reflection_source_id {
        reflect(store, graph, scheduler, state, &source_id, request.action).await
    } else {
        state.status = ExecutionStatus::Running;
        state.pending_node = None;
        scheduler.resume(graph, &mut state).await?;
        if state.status == ExecutionStatus::Completed {
            state.finalize(ExecutionStatus::Completed);
        }
        store.save(&state).await?;
        Ok(state)
    }
}

/// Transition every execution that's been awaiting input for at least `ttl`
/// to `Completed` with an auto-cancelled result, rather than leaving it
/// paused forever.
pub async fn sweep_stale_executions(store: &dyn ExecutionStore, ttl: Duration) -> Result<usize, OrchestratorError> {
    let now = Utc::now();
    let mut swept = 0usize;
    for mut state in store.list_awaiting_human_input().await? {
        let Some(requested_at) = state.human_input_requested_at else { continue };
        let elapsed = now.signed_duration_since(requested_at).to_std().unwrap_or_default();
        if elapsed >= ttl {
            state.human_input_required = false;
            state.result = Some(serde_json::json!({ "summary": "auto-cancelled: human input TTL exceeded" }));
            state.finalize(ExecutionStatus::Completed);
            store.save(&state).await?;
            swept += 1;
        }
    }
    Ok(swept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkpoint::InMemoryExecutionStore;
    use graph_core::graph::{Edge, Node, NodeConfig, NodeType};

    fn linear_graph_with_review() -> Graph {
        Graph {
            nodes: vec![
                Node { id: "start".into(), node_type: NodeType::StartNode, data: NodeConfig::default() },
                Node {
                    id: "review".into(),
                    node_type: NodeType::UserProxyAgent,
                    data: NodeConfig { require_human_input: Some(true), name: Some("Reviewer".into()), ..Default::default() },
                },
                Node { id: "end".into(), node_type: NodeType::EndNode, data: NodeConfig::default() },
            ],
            edges: vec![
                Edge { source: "start".into(), target: "review".into(), edge_type: EdgeType::Sequential },
                Edge { source: "review".into(), target: "end".into(), edge_type: EdgeType::Sequential },
            ],
        }
    }

    #[tokio::test]
    async fn handle_scheduler_pause_builds_plain_context() {
        let store = InMemoryExecutionStore::new();
        let graph = linear_graph_with_review();
        let mut state = ExecutionState::new(Uuid::new_v4());
        state.status = ExecutionStatus::AwaitingHumanInput;
        state.pending_node = Some("review".to_string());
        state.executed_nodes.insert("start".to_string(), "hi".to_string());
        store.save(&state).await.unwrap();

        handle_scheduler_pause(&store, &graph, &mut state).await.unwrap();

        assert!(state.human_input_required);
        let ctx = state.human_input_context.unwrap();
        assert_eq!(ctx.agent_name.as_deref(), Some("Reviewer"));
        assert!(ctx.reflection_source_id.is_none());
    }

    #[tokio::test]
    async fn handle_scheduler_pause_detects_reflection_cycle() {
        let store = InMemoryExecutionStore::new();
        let graph = Graph {
            nodes: vec![
                Node { id: "start".into(), node_type: NodeType::StartNode, data: NodeConfig::default() },
                Node {
                    id: "a".into(),
                    node_type: NodeType::AssistantAgent,
                    data: NodeConfig { name: Some("Writer".into()), ..Default::default() },
                },
                Node {
                    id: "review".into(),
                    node_type: NodeType::UserProxyAgent,
                    data: NodeConfig { require_human_input: Some(true), ..Default::default() },
                },
                Node { id: "end".into(), node_type: NodeType::EndNode, data: NodeConfig::default() },
            ],
            edges: vec![
                Edge { source: "start".into(), target: "a".into(), edge_type: EdgeType::Sequential },
                Edge { source: "a".into(), target: "review".into(), edge_type: EdgeType::Reflection },
                Edge { source: "review".into(), target: "end".into(), edge_type: EdgeType::Sequential },
            ],
        };
        let mut state = ExecutionState::new(Uuid::new_v4());
        state.status = ExecutionStatus::AwaitingHumanInput;
        state.pending_node = Some("review".to_string());
        state.executed_nodes.insert("a".to_string(), "draft".to_string());
        store.save(&state).await.unwrap();

        handle_scheduler_pause(&store, &graph, &mut state).await.unwrap();

        let ctx = state.human_input_context.unwrap();
        assert_eq!(ctx.reflection_source_id.as_deref(), Some("a"));
        assert_eq!(ctx.reflection_source.as_deref(), Some("Writer"));
        assert_eq!(ctx.iteration, Some(1));
    }

    #[tokio::test]
    async fn resume_routes_input_and_continues_to_completion() {
        let store = InMemoryExecutionStore::new();
        let graph = linear_graph_with_review();
        let mut state = ExecutionState::new(Uuid::new_v4());
        state.executed_nodes.insert("start".to_string(), "hi".to_string());
        handle_scheduler_pause(&store, &graph, &mut state).await.unwrap();

        let mut scheduler = Scheduler::new();
        scheduler.register(NodeType::StartNode, std::sync::Arc::new(crate::executors::MarkerExecutor));
        scheduler.register(NodeType::EndNode, std::sync::Arc::new(crate::executors::MarkerExecutor));
        scheduler.register(NodeType::UserProxyAgent, std::sync::Arc::new(crate::executors::UserProxyExecutor));

        let request = ResumeRequest { execution_id: state.execution_id, human_input: "approved".to_string(), action: ResumeAction::Submit };
        let never_reflect = |_: &dyn ExecutionStore, _: &Graph, _: &Scheduler, _: ExecutionState, _: &str, _: ResumeAction| -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ExecutionState, OrchestratorError>> + Send>> {
            unreachable!("no reflection edge in this graph")
        };
        let resumed = resume(&store, &graph, &scheduler, &NullAuditLog, never_reflect, request).await.unwrap();
        assert_eq!(resumed.status, ExecutionStatus::Completed);
        assert_eq!(resumed.executed_nodes.get("review").map(String::as_str), Some("approved"));
    }

    #[tokio::test]
    async fn resuming_a_non_paused_execution_is_rejected() {
        let store = InMemoryExecutionStore::new();
        let state = ExecutionState::new(Uuid::new_v4());
        store.save(&state).await.unwrap();

        let graph = linear_graph_with_review();
        let scheduler = Scheduler::new();
        let request = ResumeRequest { execution_id: state.execution_id, human_input: "x".to_string(), action: ResumeAction::Submit };
        let never_reflect = |_: &dyn ExecutionStore, _: &Graph, _: &Scheduler, _: ExecutionState, _: &str, _: ResumeAction| -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ExecutionState, OrchestratorError>> + Send>> {
            unreachable!()
        };
        let err = resume(&store, &graph, &scheduler, &NullAuditLog, never_reflect, request).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[tokio::test]
    async fn sweeps_stale_paused_executions() {
        let store = InMemoryExecutionStore::new();
        let mut state = ExecutionState::new(Uuid::new_v4());
        state.status = ExecutionStatus::AwaitingHumanInput;
        state.human_input_required = true;
        state.human_input_requested_at = Some(Utc::now() - chrono::Duration::hours(2));
        store.save(&state).await.unwrap();

        let swept = sweep_stale_executions(&store, Duration::from_secs(3600)).await.unwrap();
        assert_eq!(swept, 1);
        let reloaded = store.load(state.execution_id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, ExecutionStatus::Completed);
    }
}
