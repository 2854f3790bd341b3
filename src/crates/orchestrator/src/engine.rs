//! Workflow submission and resume entry points: the glue between a client's
//! `POST /executions` / `POST /human-input/submit` request and the pieces
//! already built (graph validation, the scheduler, C6's pause/resume
//! controller, C7's reflection handler).

use std::sync::Arc;

use graph_core::graph::{Graph, NodeType};
use graph_core::scheduler::{GcmNodeExecutor, Scheduler};
use graph_core::state::ExecutionState;
use graph_core::ExecutionStatus;
use uuid::Uuid;

use checkpoint::ExecutionStore;

use crate::credentials::CredentialStore;
use crate::docaware::DocAwareSearch;
use crate::error::OrchestratorError;
use crate::executors::{AssistantExecutor, GcmBridge, MarkerExecutor, UserProxyExecutor};
use crate::human_input::{self, HumanInputAuditLog, ResumeRequest};
use crate::reflection::{self, LlmReflectionRerunner};

/// Owns the shared, project-independent dependencies (persistence,
/// credentials, document search, audit log) and builds a fresh
/// [`Scheduler`] per submission/resume, since each node executor needs the
/// submitting project's credential scope baked in at construction time -
/// see `crate::executors::AssistantExecutor::new`.
pub struct Engine {
    store: Arc<dyn ExecutionStore>,
    audit: Arc<dyn HumanInputAuditLog>,
    credentials: Arc<dyn CredentialStore>,
    docaware: Option<Arc<dyn DocAwareSearch>>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        audit: Arc<dyn HumanInputAuditLog>,
        credentials: Arc<dyn CredentialStore>,
        docaware: Option<Arc<dyn DocAwareSearch>>,
    ) -> Self {
        Self { store, audit, credentials, docaware }
    }

    fn build_scheduler(&self, project_id: &str) -> Scheduler {
        let mut scheduler = Scheduler::new();
        scheduler.register(NodeType::StartNode, Arc::new(MarkerExecutor));
        scheduler.register(NodeType::EndNode, Arc::new(MarkerExecutor));
        scheduler.register(NodeType::UserProxyAgent, Arc::new(UserProxyExecutor));
        scheduler.register(
            NodeType::AssistantAgent,
            Arc::new(AssistantExecutor::new(self.credentials.clone(), self.docaware.clone(), project_id.to_string())),
        );
        scheduler.register(
            NodeType::GroupChatManager,
            Arc::new(GcmNodeExecutor(Arc::new(GcmBridge::new(self.credentials.clone(), self.docaware.clone(), project_id.to_string())))),
        );
        scheduler
    }

    /// `POST /executions`: validate `graph`, seed its `StartNode` with
    /// `input`, run the scheduler to completion or to the first pause, and
    /// persist the result either way.
    pub async fn submit(
        &self,
        graph: &Graph,
        input: String,
        project_id: String,
        workflow_id: Option<String>,
    ) -> Result<ExecutionState, OrchestratorError> {
        graph.validate()?;
        let start = graph
            .nodes
            .iter()
            .find(|n| n.node_type == NodeType::StartNode)
            .ok_or_else(|| OrchestratorError::Validation("graph has no StartNode".into()))?;

        let mut state = ExecutionState::new(Uuid::new_v4());
        state.status = ExecutionStatus::Running;
        state.project_id = Some(project_id.clone());
        state.workflow_id = workflow_id;
        state.executed_nodes.insert(start.id.clone(), input.clone());
        state.conversation_history.push_str(&format!("Input: {input}\n"));
        let start_name = start.data.name.clone().unwrap_or_else(|| start.id.clone());
        state.push_message(start.id.clone(), start_name, "StartNode", input, "system");

        let scheduler = self.build_scheduler(&project_id);
        if let Err(e) = scheduler.run(graph, &mut state).await {
            // `Scheduler::run` already set `status`/`error` on a node
            // failure; `finalize` additionally stamps duration and the
            // agent-involvement count before this gets persisted.
            state.finalize(ExecutionStatus::Failed);
            self.store.save(&state).await?;
            return Err(e.into());
        }

        match state.status {
            ExecutionStatus::AwaitingHumanInput => human_input::handle_scheduler_pause(self.store.as_ref(), graph, &mut state).await?,
            ExecutionStatus::Completed => state.finalize(ExecutionStatus::Completed),
            _ => {}
        }
        self.store.save(&state).await?;
        Ok(state)
    }

    /// `POST /human-input/submit`: resolve the execution's project from its
    /// stored state (so the caller never has to repeat it), build a
    /// scheduler scoped to that project, and hand off to
    /// [`human_input::resume`] - wiring [`reflection::handle`] in as the
    /// `reflect` continuation for a reflection cycle.
    pub async fn resume(&self, graph: &Graph, request: ResumeRequest) -> Result<ExecutionState, OrchestratorError> {
        let peeked = self
            .store
            .load(request.execution_id)
            .await?
            .ok_or_else(|| OrchestratorError::Configuration(format!("execution {} not found", request.execution_id)))?;
        let project_id = peeked.project_id.clone().unwrap_or_default();

        let scheduler = self.build_scheduler(&project_id);
        let rerunner: Arc<dyn reflection::ReflectionRerunner> =
            Arc::new(LlmReflectionRerunner::new(self.credentials.clone(), self.docaware.clone(), project_id));

        // `async move` below owns its clone of `rerunner` so the returned
        // future doesn't borrow anything local to this closure call - only
        // `store`/`graph`/`scheduler`/`source_id`, whose lifetimes already
        // come from `resume`'s own parameters.
        let reflect = move |store: &dyn ExecutionStore,
                             graph: &Graph,
                             scheduler: &Scheduler,
                             state: ExecutionState,
                             source_id: &str,
                             action: human_input::ResumeAction|
              -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ExecutionState, OrchestratorError>> + Send + '_>> {
            let rerunner = rerunner.clone();
            Box::pin(async move { reflection::handle(store, graph, scheduler, state, source_id, action, rerunner.as_ref()).await })
        };

        human_input::resume(self.store.as_ref(), graph, &scheduler, self.audit.as_ref(), reflect, request).await
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentialStore;
    use crate::human_input::{NullAuditLog, ResumeAction};
    use checkpoint::InMemoryExecutionStore;
    use graph_core::graph::{Edge, EdgeType, Node, NodeConfig, NodeType};

    fn engine() -> Engine {
        let store = Arc::new(InMemoryExecutionStore::new());
        let credentials = Arc::new(StaticCredentialStore::new().with_key("proj-1", "openai", "sk-real-looking-key-123"));
        Engine::new(store, Arc::new(NullAuditLog), credentials, None)
    }

    fn linear_graph() -> Graph {
        Graph {
            nodes: vec![
                Node { id: "start".into(), node_type: NodeType::StartNode, data: NodeConfig::default() },
                Node {
                    id: "a".into(),
                    node_type: NodeType::AssistantAgent,
                    data: NodeConfig { llm_provider: Some("openai".into()), ..Default::default() },
                },
                Node { id: "end".into(), node_type: NodeType::EndNode, data: NodeConfig::default() },
            ],
            edges: vec![
                Edge { source: "start".into(), target: "a".into(), edge_type: EdgeType::Sequential },
                Edge { source: "a".into(), target: "end".into(), edge_type: EdgeType::Sequential },
            ],
        }
    }

    fn review_graph() -> Graph {
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
    async fn submit_rejects_an_invalid_graph() {
        let engine = engine();
        let graph = Graph { nodes: vec![], edges: vec![] };
        let err = engine.submit(&graph, "hi".into(), "proj-1".into(), None).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Graph(_)));
    }

    #[tokio::test]
    async fn submit_pauses_at_a_human_input_node() {
        let engine = engine();
        let graph = review_graph();
        let state = engine.submit(&graph, "hello".into(), "proj-1".into(), Some("wf-1".into())).await.unwrap();

        assert_eq!(state.status, ExecutionStatus::AwaitingHumanInput);
        assert_eq!(state.pending_node.as_deref(), Some("review"));
        assert_eq!(state.project_id.as_deref(), Some("proj-1"));
        assert_eq!(state.workflow_id.as_deref(), Some("wf-1"));
        assert!(state.human_input_context.is_some());
    }

    #[tokio::test]
    async fn resume_continues_a_paused_execution_to_completion() {
        let engine = engine();
        let graph = review_graph();
        let state = engine.submit(&graph, "hello".into(), "proj-1".into(), None).await.unwrap();

        let request = ResumeRequest { execution_id: state.execution_id, human_input: "approved".into(), action: ResumeAction::Submit };
        let resumed = engine.resume(&graph, request).await.unwrap();

        assert_eq!(resumed.status, ExecutionStatus::Completed);
        assert_eq!(resumed.executed_nodes.get("review").map(String::as_str), Some("approved"));
    }

    #[tokio::test]
    async fn resume_rejects_an_unknown_execution() {
        let engine = engine();
        let graph = review_graph();
        let request = ResumeRequest { execution_id: uuid::Uuid::new_v4(), human_input: "x".into(), action: ResumeAction::Submit };
        let err = engine.resume(&graph, request).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[tokio::test]
    async fn submit_fails_the_execution_when_a_node_has_no_credentials() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let engine = Engine::new(store, Arc::new(NullAuditLog), Arc::new(StaticCredentialStore::new()), None);
        let graph = linear_graph();
        let state = engine.submit(&graph, "hello".into(), "proj-1".into(), None).await.unwrap_err();
        assert!(matches!(state, OrchestratorError::Graph(_)));
    }
}
