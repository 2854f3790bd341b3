//! Reflection cycle handler.
//!
//! A reflection edge (`AssistantAgent A -> UserProxyAgent U`) turns a plain
//! pause into a loop: `A` writes a draft, `U` pauses for review, and the
//! human either accepts it (`submit`) or sends it back with feedback
//! (`iterate`). [`handle`] is the `reflect` closure [`crate::human_input::resume`]
//! hands off to once it sees `human_input_context.reflection_source_id` set -
//! everything here runs *after* `resume` has already recorded the human's
//! raw input and persisted it once.

use std::sync::Arc;

use async_trait::async_trait;
use graph_core::graph::Graph;
use graph_core::interrupt;
use graph_core::scheduler::Scheduler;
use graph_core::state::{ExecutionState, HumanInputContext};
use graph_core::ExecutionStatus;

use checkpoint::ExecutionStore;

use crate::credentials::CredentialStore;
use crate::delegate_executor::{self, DelegateOutcome};
use crate::docaware::DocAwareSearch;
use crate::error::OrchestratorError;
use crate::human_input::ResumeAction;
use crate::providers;

const DEFAULT_NODE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);
const DEFAULT_PROVIDER: &str = "openai";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// Re-runs a reflection source node with the human's feedback folded into
/// its prompt. Abstracted as a trait (rather than a concrete struct tied to
/// `AssistantExecutor`'s private fields) so tests can script a rerun
/// outcome without a real LLM call, the same way `DocAwareSearch` and
/// `CredentialStore` are trait objects rather than concrete types.
#[async_trait]
pub trait ReflectionRerunner: Send + Sync {
    async fn rerun(&self, graph: &Graph, source_id: &str, original_input: &str, feedback: &str) -> DelegateOutcome;
}

/// Production [`ReflectionRerunner`]: mirrors `AssistantExecutor::execute`'s
/// own prompt-building path so a regenerated draft gets the same
/// credential/docaware treatment the node's first pass got.
pub struct LlmReflectionRerunner {
    credentials: Arc<dyn CredentialStore>,
    docaware: Option<Arc<dyn DocAwareSearch>>,
    project_id: String,
}

impl LlmReflectionRerunner {
    pub fn new(credentials: Arc<dyn CredentialStore>, docaware: Option<Arc<dyn DocAwareSearch>>, project_id: String) -> Self {
        Self { credentials, docaware, project_id }
    }
}

#[async_trait]
impl ReflectionRerunner for LlmReflectionRerunner {
    async fn rerun(&self, graph: &Graph, source_id: &str, original_input: &str, feedback: &str) -> DelegateOutcome {
        let node = match graph.node(source_id) {
            Some(n) => n,
            None => {
                return DelegateOutcome {
                    success: false,
                    response: format!("ERROR: unknown reflection source '{source_id}'"),
                    status: "error".to_string(),
                    confidence: 0.0,
                    retry_count: 0,
                    error: Some(format!("unknown node '{source_id}'")),
                }
            }
        };

        let provider_name = node.data.llm_provider.as_deref().unwrap_or(DEFAULT_PROVIDER);
        let model = node.data.llm_model.as_deref().unwrap_or(DEFAULT_MODEL);
        let provider = match providers::build_provider(self.credentials.as_ref(), &self.project_id, provider_name, model).await {
            Ok(p) => p,
            Err(e) => {
                return DelegateOutcome {
                    success: false,
                    response: format!("ERROR: {e}"),
                    status: "error".to_string(),
                    confidence: 0.0,
                    retry_count: 0,
                    error: Some(e.to_string()),
                }
            }
        };

        let system_message = node.data.system_message.as_deref().unwrap_or("");
        let mut prompt = format!(
            "{system_message}\n\nOriginal input:\n{original_input}\n\nYour previous response was reviewed and sent back for revision. Reviewer feedback:\n{feedback}\n\nProduce a revised response that addresses this feedback."
        );

        if crate::docaware::is_docaware_enabled(node.data.doc_aware.unwrap_or(false), node.data.search_method.as_deref()) {
            if let Some(search) = &self.docaware {
                let empty_filters: Vec<String> = Vec::new();
                let context_text = crate::docaware::retrieve_context(
                    search.as_ref(),
                    &self.project_id,
                    original_input,
                    node.data.search_method.as_deref().unwrap_or(""),
                    node.data.search_parameters.as_ref().unwrap_or(&serde_json::Value::Null),
                    feedback,
                    node.data.content_filters.as_deref().unwrap_or(&empty_filters),
                )
                .await;
                if !context_text.is_empty() {
                    prompt.push_str("\n\nRetrieved context:\n");
                    prompt.push_str(&context_text);
                }
            }
        }

        delegate_executor::execute_with_retry(
            provider.as_ref(),
            &prompt,
            node.data.temperature.unwrap_or(0.7),
            node.data.max_tokens.unwrap_or(1024),
            DEFAULT_NODE_TIMEOUT,
            0,
        )
        .await
    }
}

/// Re-merge `state` against whatever's currently persisted, the same guard
/// `human_input::handle_scheduler_pause` applies on the plain pause path -
/// a reflection resume races the same concurrent-writer hazard.
async fn refresh_from_store(store: &dyn ExecutionStore, state: &mut ExecutionState) -> Result<(), OrchestratorError> {
    if let Some(stored) = store.load(state.execution_id).await? {
        let merged_messages = interrupt::merge_messages_data(&stored, state);
        let local_nodes = std::mem::take(&mut state.executed_nodes);
        state.executed_nodes = interrupt::merge_executed_nodes(stored.executed_nodes, local_nodes);
        state.messages_data = merged_messages;
    }
    Ok(())
}

/// The last `human_input` message `human_input::resume` pushed before
/// handing off here - the feedback text for this iteration.
fn latest_human_feedback(state: &ExecutionState) -> String {
    state
        .messages_data
        .iter()
        .rev()
        .find(|m| m.message_type == "human_input")
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

/// The `reflect` closure body: called by [`crate::human_input::resume`]
/// once a reflection cycle is detected. `state` already has the human's
/// raw input recorded and persisted; `source_id` is the reflection
/// source's node id and `node_id` in `state.pending_node` is the paused
/// `UserProxyAgent`.
pub async fn handle(
    store: &dyn ExecutionStore,
    graph: &Graph,
    scheduler: &Scheduler,
    mut state: ExecutionState,
    source_id: &str,
    action: ResumeAction,
    rerunner: &dyn ReflectionRerunner,
) -> Result<ExecutionState, OrchestratorError> {
    let ctx = state
        .human_input_context
        .clone()
        .ok_or_else(|| OrchestratorError::Scheduling("reflection handoff without a human_input_context".into()))?;
    let user_proxy_id = state
        .pending_node
        .clone()
        .ok_or_else(|| OrchestratorError::Scheduling("reflection handoff without a pending_node".into()))?;
    let source_node = graph
        .node(source_id)
        .ok_or_else(|| OrchestratorError::Configuration(format!("unknown reflection source '{source_id}'")))?;
    let max_iterations = source_node.data.max_iterations.or(source_node.data.max_rounds).unwrap_or(DEFAULT_MAX_ITERATIONS).max(1);
    let iteration = ctx.iteration.unwrap_or(1);
    let feedback = latest_human_feedback(&state);

    let force_submit = matches!(action, ResumeAction::Iterate) && iteration >= max_iterations;

    if matches!(action, ResumeAction::Submit) || force_submit {
        let final_text = if feedback.trim().is_empty() { ctx.primary_input.clone().unwrap_or_default() } else { feedback.clone() };
        let agent_name = ctx.reflection_source.clone().unwrap_or_else(|| source_id.to_string());

        // Written to both the reflection source and the reviewer node, since
        // whichever one a downstream sequential edge targets must see a
        // completed dependency.
        state.executed_nodes.insert(source_id.to_string(), final_text.clone());
        state.executed_nodes.insert(user_proxy_id.clone(), feedback.clone());
        state.push_message(source_id.to_string(), agent_name, "AssistantAgent", final_text, "reflection_final");
        state.human_input_context = None;

        refresh_from_store(store, &mut state).await?;

        state.status = ExecutionStatus::Running;
        state.pending_node = None;
        scheduler.resume(graph, &mut state).await?;
        if state.status == ExecutionStatus::Completed {
            state.finalize(ExecutionStatus::Completed);
        }
        store.save(&state).await?;
        return Ok(state);
    }

    // action == Iterate, under the iteration cap: re-invoke the source node.
    let original_input = ctx.primary_input.clone().unwrap_or_default();
    let outcome = rerunner.rerun(graph, source_id, &original_input, &feedback).await;

    if !outcome.success {
        refresh_from_store(store, &mut state).await?;
        state.error = Some(outcome.error.unwrap_or(outcome.response));
        state.finalize(ExecutionStatus::Failed);
        store.save(&state).await?;
        return Ok(state);
    }

    let agent_name = ctx.reflection_source.clone().unwrap_or_else(|| source_id.to_string());
    state.executed_nodes.insert(source_id.to_string(), outcome.response.clone());
    state.push_message(source_id.to_string(), agent_name.clone(), "AssistantAgent", outcome.response.clone(), "agent_output");

    let new_context = HumanInputContext {
        primary_input: Some(outcome.response),
        iteration: Some(iteration + 1),
        ..ctx
    };

    refresh_from_store(store, &mut state).await?;
    crate::human_input::pause_with_context(store, &mut state, &user_proxy_id, new_context).await?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkpoint::InMemoryExecutionStore;
    use graph_core::graph::{Edge, EdgeType, Node, NodeConfig, NodeType};
    use std::sync::Mutex;
    use uuid::Uuid;

    fn reflection_graph(max_iterations: u32) -> Graph {
        Graph {
            nodes: vec![
                Node { id: "start".into(), node_type: NodeType::StartNode, data: NodeConfig::default() },
                Node {
                    id: "a".into(),
                    node_type: NodeType::AssistantAgent,
                    data: NodeConfig { name: Some("Writer".into()), max_iterations: Some(max_iterations), ..Default::default() },
                },
                Node {
                    id: "review".into(),
                    node_type: NodeType::UserProxyAgent,
                    data: NodeConfig { require_human_input: Some(true), name: Some("Reviewer".into()), ..Default::default() },
                },
                Node { id: "end".into(), node_type: NodeType::EndNode, data: NodeConfig::default() },
            ],
            edges: vec![
                Edge { source: "start".into(), target: "a".into(), edge_type: EdgeType::Sequential },
                Edge { source: "a".into(), target: "review".into(), edge_type: EdgeType::Reflection },
                Edge { source: "review".into(), target: "end".into(), edge_type: EdgeType::Sequential },
            ],
        }
    }

    fn paused_state(graph: &Graph) -> ExecutionState {
        let mut state = ExecutionState::new(Uuid::new_v4());
        state.executed_nodes.insert("start".to_string(), "topic".to_string());
        state.executed_nodes.insert("a".to_string(), "draft v1".to_string());
        state.status = ExecutionStatus::AwaitingHumanInput;
        state.pending_node = Some("review".to_string());
        state.human_input_context = Some(HumanInputContext {
            agent_id: Some("review".to_string()),
            agent_name: Some("Reviewer".to_string()),
            reflection_source: Some("Writer".to_string()),
            reflection_source_id: Some("a".to_string()),
            iteration: Some(1),
            primary_input: Some("draft v1".to_string()),
            ..Default::default()
        });
        state.push_message("a", "Writer", "AssistantAgent", "draft v1", "agent_output");
        let _ = graph;
        state
    }

    fn scheduler() -> Scheduler {
        let mut scheduler = Scheduler::new();
        scheduler.register(NodeType::StartNode, Arc::new(crate::executors::MarkerExecutor));
        scheduler.register(NodeType::EndNode, Arc::new(crate::executors::MarkerExecutor));
        scheduler.register(NodeType::AssistantAgent, Arc::new(crate::executors::MarkerExecutor));
        scheduler.register(NodeType::UserProxyAgent, Arc::new(crate::executors::UserProxyExecutor));
        scheduler
    }

    struct StubRerunner(Mutex<Vec<DelegateOutcome>>);

    #[async_trait]
    impl ReflectionRerunner for StubRerunner {
        async fn rerun(&self, _graph: &Graph, _source_id: &str, _original: &str, _feedback: &str) -> DelegateOutcome {
            self.0.lock().unwrap().remove(0)
        }
    }

    fn ok_outcome(text: &str) -> DelegateOutcome {
        DelegateOutcome { success: true, response: text.to_string(), status: "completed".to_string(), confidence: 1.0, retry_count: 0, error: None }
    }

    #[tokio::test]
    async fn submit_writes_final_text_to_source_and_runs_to_completion() {
        let store = InMemoryExecutionStore::new();
        let graph = reflection_graph(3);
        let mut state = paused_state(&graph);
        state.push_message("review", "Reviewer", "UserProxyAgent", "looks good", "human_input");
        store.save(&state).await.unwrap();

        let rerunner = StubRerunner(Mutex::new(vec![]));
        let sched = scheduler();
        let result = handle(&store, &graph, &sched, state, "a", ResumeAction::Submit, &rerunner).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.executed_nodes.get("a").map(String::as_str), Some("looks good"));
        assert!(result.messages_data.iter().any(|m| m.is_reflection_final()));
    }

    #[tokio::test]
    async fn iterate_reruns_source_and_pauses_again() {
        let store = InMemoryExecutionStore::new();
        let graph = reflection_graph(3);
        let mut state = paused_state(&graph);
        state.push_message("review", "Reviewer", "UserProxyAgent", "needs more detail", "human_input");
        store.save(&state).await.unwrap();

        let rerunner = StubRerunner(Mutex::new(vec![ok_outcome("draft v2")]));
        let sched = scheduler();
        let result = handle(&store, &graph, &sched, state, "a", ResumeAction::Iterate, &rerunner).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::AwaitingHumanInput);
        assert_eq!(result.executed_nodes.get("a").map(String::as_str), Some("draft v2"));
        let ctx = result.human_input_context.unwrap();
        assert_eq!(ctx.iteration, Some(2));
        assert_eq!(ctx.primary_input.as_deref(), Some("draft v2"));
    }

    #[tokio::test]
    async fn iterate_is_forced_to_submit_once_max_iterations_reached() {
        let store = InMemoryExecutionStore::new();
        let graph = reflection_graph(1);
        let mut state = paused_state(&graph);
        state.push_message("review", "Reviewer", "UserProxyAgent", "ship it anyway", "human_input");
        store.save(&state).await.unwrap();

        let rerunner = StubRerunner(Mutex::new(vec![]));
        let sched = scheduler();
        let result = handle(&store, &graph, &sched, state, "a", ResumeAction::Iterate, &rerunner).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.executed_nodes.get("a").map(String::as_str), Some("ship it anyway"));
    }

    #[tokio::test]
    async fn failed_rerun_fails_the_execution() {
        let store = InMemoryExecutionStore::new();
        let graph = reflection_graph(3);
        let mut state = paused_state(&graph);
        state.push_message("review", "Reviewer", "UserProxyAgent", "try again", "human_input");
        store.save(&state).await.unwrap();

        let rerunner = StubRerunner(Mutex::new(vec![DelegateOutcome {
            success: false,
            response: "ERROR: boom".to_string(),
            status: "error".to_string(),
            confidence: 0.0,
            retry_count: 2,
            error: Some("boom".to_string()),
        }]));
        let sched = scheduler();
        let result = handle(&store, &graph, &sched, state, "a", ResumeAction::Iterate, &rerunner).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }
}
