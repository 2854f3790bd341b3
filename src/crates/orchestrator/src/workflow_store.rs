//! Recall of a submitted [`Graph`] by `workflow_id`.
//!
//! `POST /human-input/submit` only carries an `execution_id`; resuming a
//! paused execution needs the same [`Graph`] that was supplied at
//! submission time (`Engine::resume` takes one explicitly, same as
//! `Engine::submit`). This is not a workflow template library - there is no
//! versioning, naming, or listing here, just enough recall to drive a
//! resume. Template management proper is out of scope for this workspace.

use async_trait::async_trait;
use graph_core::graph::Graph;

use crate::error::OrchestratorError;

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn save_graph(&self, workflow_id: &str, graph: &Graph) -> Result<(), OrchestratorError>;
    async fn load_graph(&self, workflow_id: &str) -> Result<Option<Graph>, OrchestratorError>;
}

/// In-memory [`WorkflowStore`], used in tests and for single-process
/// embedding where `orchestrator::db::SqliteWorkflowStore` isn't wired up.
pub struct InMemoryWorkflowStore {
    graphs: parking_lot::RwLock<std::collections::HashMap<String, Graph>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self { graphs: parking_lot::RwLock::new(std::collections::HashMap::new()) }
    }
}

impl Default for InMemoryWorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn save_graph(&self, workflow_id: &str, graph: &Graph) -> Result<(), OrchestratorError> {
        self.graphs.write().insert(workflow_id.to_string(), graph.clone());
        Ok(())
    }

    async fn load_graph(&self, workflow_id: &str) -> Result<Option<Graph>, OrchestratorError> {
        Ok(self.graphs.read().get(workflow_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_core::graph::{Node, NodeConfig, NodeType};

    fn graph() -> Graph {
        Graph { nodes: vec![Node { id: "start".into(), node_type: NodeType::StartNode, data: NodeConfig::default() }], edges: vec![] }
    }

    #[tokio::test]
    async fn round_trips_a_saved_graph() {
        let store = InMemoryWorkflowStore::new();
        store.save_graph("wf-1", &graph()).await.unwrap();
        let loaded = store.load_graph("wf-1").await.unwrap().unwrap();
        assert_eq!(loaded.nodes[0].id, "start");
    }

    #[tokio::test]
    async fn missing_workflow_returns_none() {
        let store = InMemoryWorkflowStore::new();
        assert!(store.load_graph("ghost").await.unwrap().is_none());
    }
}
