//! [`graph_core::scheduler::NodeExecutor`] implementations: the per-node-type
//! execution semantics graph_core itself knows nothing about.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use graph_core::error::{GraphError, Result as GraphResult};
use graph_core::graph::{Graph, NodeId, NodeType};
use graph_core::scheduler::{GcmExecutor, NodeExecutor, NodeOutcome};
use graph_core::state::ExecutionState;

use crate::context;
use crate::credentials::CredentialStore;
use crate::delegate_executor::{self, DelegateOutcome};
use crate::docaware::{self, DocAwareSearch};
use crate::gcm::{self, DelegateHandle, DelegateInvoker, GcmSettings};
use crate::providers;

const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_PROVIDER: &str = "openai";

/// `StartNode`/`EndNode`: a no-op marker, recorded as a `"system"` message by
/// the scheduler. A real run always has its `StartNode` pre-seeded with the
/// submitted input by `crate::engine` before the scheduler ever runs, so
/// this executor only fires defensively (a graph submitted without going
/// through `engine::Engine::submit`, or an `EndNode` with no successors).
pub struct MarkerExecutor;

#[async_trait]
impl NodeExecutor for MarkerExecutor {
    async fn execute(&self, node_id: &NodeId, graph: &Graph, _state: &ExecutionState) -> GraphResult<NodeOutcome> {
        let node = graph.node(node_id).expect("scheduler only dispatches nodes present in the graph");
        let label = match node.node_type {
            NodeType::StartNode => "start",
            NodeType::EndNode => "end",
            other => return Err(GraphError::Configuration(format!("MarkerExecutor cannot run a {other:?} node"))),
        };
        Ok(NodeOutcome::done(format!("[{label}]")))
    }
}

/// `UserProxyAgent`: pauses the run when `require_human_input` is set,
/// otherwise passes through as a no-op (a `UserProxyAgent` with no human
/// gate is just a routing point in the graph).
pub struct UserProxyExecutor;

#[async_trait]
impl NodeExecutor for UserProxyExecutor {
    async fn execute(&self, node_id: &NodeId, graph: &Graph, _state: &ExecutionState) -> GraphResult<NodeOutcome> {
        let node = graph.node(node_id).expect("scheduler only dispatches nodes present in the graph");
        if node.data.require_human_input.unwrap_or(false) {
            let name = node.data.name.clone().unwrap_or_else(|| node_id.clone());
            Ok(NodeOutcome::AwaitingHumanInput { reason: format!("'{name}' requires human input") })
        } else {
            Ok(NodeOutcome::done(String::new()))
        }
    }
}

/// `AssistantAgent`: aggregate dependency outputs, optionally fold in
/// retrieved document context, call the node's configured LLM provider.
pub struct AssistantExecutor {
    credentials: Arc<dyn CredentialStore>,
    docaware: Option<Arc<dyn DocAwareSearch>>,
    project_id: String,
}

impl AssistantExecutor {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        docaware: Option<Arc<dyn DocAwareSearch>>,
        project_id: String,
    ) -> Self {
        Self { credentials, docaware, project_id }
    }
}

#[async_trait]
impl NodeExecutor for AssistantExecutor {
    async fn execute(&self, node_id: &NodeId, graph: &Graph, state: &ExecutionState) -> GraphResult<NodeOutcome> {
        let node = graph.node(node_id).expect("scheduler only dispatches nodes present in the graph");
        let aggregated = context::aggregate(graph, node_id, state);

        let provider_name = node.data.llm_provider.as_deref().unwrap_or(DEFAULT_PROVIDER);
        let model = node.data.llm_model.as_deref().unwrap_or(DEFAULT_MODEL);
        let provider = providers::build_provider(self.credentials.as_ref(), &self.project_id, provider_name, model)
            .await
            .map_err(|e| GraphError::node_execution(node_id.clone(), e.to_string()))?;

        let system_message = node.data.system_message.as_deref().unwrap_or("");
        let input = if aggregated.formatted_context.is_empty() {
            aggregated.primary_input.clone()
        } else {
            aggregated.formatted_context.clone()
        };
        let mut prompt = format!("{system_message}\n\nInput:\n{input}");

        if docaware::is_docaware_enabled(node.data.doc_aware.unwrap_or(false), node.data.search_method.as_deref()) {
            if let Some(search) = &self.docaware {
                let empty_filters: Vec<String> = Vec::new();
                let context_text = docaware::retrieve_context(
                    search.as_ref(),
                    &self.project_id,
                    &aggregated.primary_input,
                    node.data.search_method.as_deref().unwrap_or(""),
                    node.data.search_parameters.as_ref().unwrap_or(&serde_json::Value::Null),
                    &aggregated.combined_text,
                    node.data.content_filters.as_deref().unwrap_or(&empty_filters),
                )
                .await;
                if !context_text.is_empty() {
                    prompt.push_str("\n\nRetrieved context:\n");
                    prompt.push_str(&context_text);
                }
            }
        }

        let outcome = delegate_executor::execute_with_retry(
            provider.as_ref(),
            &prompt,
            node.data.temperature.unwrap_or(0.7),
            node.data.max_tokens.unwrap_or(1024),
            DEFAULT_NODE_TIMEOUT,
            0,
        )
        .await;

        if !outcome.success {
            return Err(GraphError::node_execution(node_id.clone(), outcome.error.unwrap_or(outcome.response)));
        }
        Ok(NodeOutcome::done(outcome.response))
    }
}

/// Adapts a `GroupChatManager` node into a call to [`gcm::run`], borrowing
/// the graph for the duration of one `run_gcm` call so [`GraphInvoker`] can
/// resolve each delegate's own provider/model without needing to carry an
/// owned copy of the graph.
pub struct GcmBridge {
    credentials: Arc<dyn CredentialStore>,
    docaware: Option<Arc<dyn DocAwareSearch>>,
    project_id: String,
}

impl GcmBridge {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        docaware: Option<Arc<dyn DocAwareSearch>>,
        project_id: String,
    ) -> Self {
        Self { credentials, docaware, project_id }
    }
}

#[async_trait]
impl GcmExecutor for GcmBridge {
    async fn run_gcm(&self, node_id: &NodeId, graph: &Graph, state: &ExecutionState) -> GraphResult<NodeOutcome> {
        let node = graph.node(node_id).expect("scheduler only dispatches nodes present in the graph");

        let delegates: Vec<DelegateHandle> = graph
            .delegates_of(node_id)
            .into_iter()
            .filter_map(|id| graph.node(id))
            .map(|n| DelegateHandle {
                node_id: n.id.clone(),
                name: n.data.name.clone().unwrap_or_else(|| n.id.clone()),
                system_message: n.data.system_message.clone().unwrap_or_default(),
                description: n.data.description.clone().unwrap_or_default(),
            })
            .collect();

        let settings = GcmSettings::from_node_config(&node.data);
        let aggregated = context::aggregate(graph, node_id, state);
        let manager_name = node.data.name.clone().unwrap_or_else(|| node_id.clone());
        let invoker =
            GraphInvoker { graph, credentials: self.credentials.as_ref(), docaware: self.docaware.as_deref(), project_id: &self.project_id };

        let result = gcm::run(&manager_name, &settings, &delegates, &aggregated, &invoker, node_id)
            .await
            .map_err(|e| GraphError::node_execution(node_id.clone(), e.to_string()))?;

        Ok(NodeOutcome::done_with_metadata(result.output, result.transcript))
    }
}

/// Dispatch boundary [`gcm::run`] calls through: resolves the invoked node's
/// own provider/model/credentials from the graph, then reuses
/// [`delegate_executor::execute_with_retry`] for the actual call - the same
/// retry and failure-classification logic an `AssistantAgent` gets.
struct GraphInvoker<'a> {
    graph: &'a Graph,
    credentials: &'a dyn CredentialStore,
    docaware: Option<&'a dyn DocAwareSearch>,
    project_id: &'a str,
}

#[async_trait]
impl<'a> DelegateInvoker for GraphInvoker<'a> {
    async fn invoke(
        &self,
        node_id: &str,
        prompt: &str,
        temperature: f32,
        timeout: Duration,
        max_retries: usize,
    ) -> DelegateOutcome {
        let node = match self.graph.node(node_id) {
            Some(n) => n,
            None => {
                return DelegateOutcome {
                    success: false,
                    response: format!("ERROR: unknown node '{node_id}'"),
                    status: "error".to_string(),
                    confidence: 0.0,
                    retry_count: 0,
                    error: Some(format!("unknown node '{node_id}'")),
                }
            }
        };

        let provider_name = node.data.llm_provider.as_deref().unwrap_or(DEFAULT_PROVIDER);
        let model = node.data.llm_model.as_deref().unwrap_or(DEFAULT_MODEL);
        let provider = match providers::build_provider(self.credentials, self.project_id, provider_name, model).await {
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

        let mut full_prompt = prompt.to_string();
        if docaware::is_docaware_enabled(node.data.doc_aware.unwrap_or(false), node.data.search_method.as_deref()) {
            if let Some(search) = self.docaware {
                let empty_filters: Vec<String> = Vec::new();
                let context_text = docaware::retrieve_context(
                    search,
                    self.project_id,
                    prompt,
                    node.data.search_method.as_deref().unwrap_or(""),
                    node.data.search_parameters.as_ref().unwrap_or(&serde_json::Value::Null),
                    prompt,
                    node.data.content_filters.as_deref().unwrap_or(&empty_filters),
                )
                .await;
                if !context_text.is_empty() {
                    full_prompt.push_str("\n\nRetrieved context:\n");
                    full_prompt.push_str(&context_text);
                }
            }
        }

        delegate_executor::execute_with_retry(
            provider.as_ref(),
            &full_prompt,
            temperature,
            node.data.max_tokens.unwrap_or(1024),
            timeout,
            max_retries,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentialStore;
    use graph_core::graph::{Edge, EdgeType, Node, NodeConfig};
    use uuid::Uuid;

    fn node(id: &str, t: NodeType, data: NodeConfig) -> Node {
        Node { id: id.into(), node_type: t, data }
    }

    #[tokio::test]
    async fn marker_executor_labels_start_and_end() {
        let graph = Graph {
            nodes: vec![node("start", NodeType::StartNode, NodeConfig::default())],
            edges: vec![],
        };
        let state = ExecutionState::new(Uuid::new_v4());
        let outcome = MarkerExecutor.execute(&"start".to_string(), &graph, &state).await.unwrap();
        match outcome {
            NodeOutcome::Done { output, .. } => assert_eq!(output, "[start]"),
            _ => panic!("expected Done"),
        }
    }

    #[tokio::test]
    async fn user_proxy_pauses_only_when_required() {
        let graph = Graph {
            nodes: vec![node(
                "review",
                NodeType::UserProxyAgent,
                NodeConfig { require_human_input: Some(true), ..Default::default() },
            )],
            edges: vec![],
        };
        let state = ExecutionState::new(Uuid::new_v4());
        let outcome = UserProxyExecutor.execute(&"review".to_string(), &graph, &state).await.unwrap();
        assert!(matches!(outcome, NodeOutcome::AwaitingHumanInput { .. }));
    }

    #[tokio::test]
    async fn user_proxy_passes_through_when_not_required() {
        let graph = Graph {
            nodes: vec![node("review", NodeType::UserProxyAgent, NodeConfig::default())],
            edges: vec![],
        };
        let state = ExecutionState::new(Uuid::new_v4());
        let outcome = UserProxyExecutor.execute(&"review".to_string(), &graph, &state).await.unwrap();
        assert!(matches!(outcome, NodeOutcome::Done { .. }));
    }

    #[tokio::test]
    async fn assistant_executor_fails_node_on_missing_credentials() {
        let graph = Graph {
            nodes: vec![
                node("start", NodeType::StartNode, NodeConfig::default()),
                node(
                    "a",
                    NodeType::AssistantAgent,
                    NodeConfig { llm_provider: Some("openai".to_string()), ..Default::default() },
                ),
            ],
            edges: vec![Edge { source: "start".into(), target: "a".into(), edge_type: EdgeType::Sequential }],
        };
        let mut state = ExecutionState::new(Uuid::new_v4());
        state.executed_nodes.insert("start".to_string(), "hello".to_string());
        let credentials = StaticCredentialStore::new();
        let executor = AssistantExecutor::new(Arc::new(credentials), None, "proj-1".to_string());
        let err = executor.execute(&"a".to_string(), &graph, &state).await.unwrap_err();
        assert!(matches!(err, GraphError::NodeExecution { .. }));
    }

    #[tokio::test]
    async fn gcm_bridge_rejects_gcm_with_no_delegates() {
        let graph = Graph {
            nodes: vec![node("gcm", NodeType::GroupChatManager, NodeConfig::default())],
            edges: vec![],
        };
        let state = ExecutionState::new(Uuid::new_v4());
        let credentials = StaticCredentialStore::new();
        let bridge = GcmBridge::new(Arc::new(credentials), None, "proj-1".to_string());
        let err = bridge.run_gcm(&"gcm".to_string(), &graph, &state).await.unwrap_err();
        assert!(matches!(err, GraphError::NodeExecution { .. }));
    }
}
