//! Level-by-level graph execution.
//!
//! Execution proceeds in supersteps (Pregel-style, without the generic
//! channel machinery): at each step, compute the set of nodes whose
//! dependencies are satisfied but which have not executed, run that whole
//! set concurrently via [`futures::future::join_all`], persist the result,
//! and repeat. There is no ordering guarantee within a level - nodes in
//! the same ready set may run in any order or interleaving.
//!
//! Dynamic dispatch over node types is a small trait-object registry
//! ([`NodeExecutor`]) rather than a match on [`crate::graph::NodeType`] in
//! one place, so a new node kind can be added without touching the
//! scheduler loop.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{GraphError, Result};
use crate::graph::{Graph, NodeId, NodeType};
use crate::state::ExecutionState;

/// Outcome of running a single node.
pub enum NodeOutcome {
    /// The node produced output and execution may continue. `metadata`
    /// carries a structured payload (a `GroupChatManager`'s full delegate
    /// conversation, for instance) that does not fit in the flattened
    /// `executed_nodes` text output but still belongs on the execution
    /// record for replay.
    Done { output: String, metadata: Option<Value> },
    /// The node is a `UserProxyAgent` requiring human input; the scheduler
    /// must pause the whole run rather than continue to later nodes.
    AwaitingHumanInput { reason: String },
}

impl NodeOutcome {
    pub fn done(output: impl Into<String>) -> Self {
        Self::Done { output: output.into(), metadata: None }
    }

    pub fn done_with_metadata(output: impl Into<String>, metadata: Value) -> Self {
        Self::Done { output: output.into(), metadata: Some(metadata) }
    }
}

/// Executes one node's logic. Implementations are registered by
/// [`NodeType`] in a [`Scheduler`].
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, node_id: &NodeId, graph: &Graph, state: &ExecutionState) -> Result<NodeOutcome>;
}

/// Narrow interface a `GroupChatManager` node dispatches into, implemented
/// outside this crate (by the orchestrator's delegation engine) so that
/// `graph_core` never depends on it - only the reverse. [`GcmNodeExecutor`]
/// adapts any [`GcmExecutor`] into a [`NodeExecutor`] for registration.
#[async_trait]
pub trait GcmExecutor: Send + Sync {
    async fn run_gcm(&self, node_id: &NodeId, graph: &Graph, state: &ExecutionState) -> Result<NodeOutcome>;
}

pub struct GcmNodeExecutor<G>(pub Arc<G>);

#[async_trait]
impl<G: GcmExecutor + 'static> NodeExecutor for GcmNodeExecutor<G> {
    async fn execute(&self, node_id: &NodeId, graph: &Graph, state: &ExecutionState) -> Result<NodeOutcome> {
        self.0.run_gcm(node_id, graph, state).await
    }
}

/// Drives a [`Graph`] to completion (or to a pause) against a mutable
/// [`ExecutionState`], dispatching each ready node to the [`NodeExecutor`]
/// registered for its [`NodeType`].
pub struct Scheduler {
    executors: HashMap<NodeType, Arc<dyn NodeExecutor>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { executors: HashMap::new() }
    }

    pub fn register(&mut self, node_type: NodeType, executor: Arc<dyn NodeExecutor>) {
        self.executors.insert(node_type, executor);
    }

    fn executor_for(&self, node_type: NodeType) -> Result<Arc<dyn NodeExecutor>> {
        self.executors
            .get(&node_type)
            .cloned()
            .ok_or_else(|| GraphError::Configuration(format!("no NodeExecutor registered for {node_type:?}")))
    }

    /// Compute the set of non-delegate nodes whose dependencies are all
    /// satisfied but which have not yet executed.
    fn ready_set(&self, graph: &Graph, state: &ExecutionState) -> Vec<NodeId> {
        let deps = graph.dependency_map();
        graph
            .nodes
            .iter()
            .filter(|n| n.node_type != NodeType::DelegateAgent)
            .filter(|n| !state.executed_nodes.contains_key(&n.id))
            .filter(|n| {
                deps.get(&n.id)
                    .map(|d| d.iter().all(|dep| state.executed_nodes.contains_key(dep)))
                    .unwrap_or(true)
            })
            .map(|n| n.id.clone())
            .collect()
    }

    /// Drive `state` forward until every non-delegate node has executed,
    /// or a `UserProxyAgent` requests a pause. On pause, `state.status` and
    /// `state.pending_node` are set and `Ok(())` is returned - a pause is
    /// not an error. Returns [`GraphError::Scheduling`] if no ready nodes
    /// remain while nodes are still outstanding (a dependency deadlock).
    pub async fn run(&self, graph: &Graph, state: &mut ExecutionState) -> Result<()> {
        let total_non_delegate = graph
            .nodes
            .iter()
            .filter(|n| n.node_type != NodeType::DelegateAgent)
            .count();

        loop {
            if state.executed_nodes.len() >= total_non_delegate {
                info!(execution_id = %state.execution_id, "graph execution complete");
                state.status = crate::state::ExecutionStatus::Completed;
                return Ok(());
            }

            let ready = self.ready_set(graph, state);
            if ready.is_empty() {
                warn!(execution_id = %state.execution_id, "no ready nodes but graph incomplete");
                return Err(GraphError::Scheduling(
                    "no ready nodes remain but some nodes have not executed".into(),
                ));
            }
            debug!(execution_id = %state.execution_id, ?ready, "dispatching level");

            let futures = ready.iter().map(|node_id| {
                let node = graph.node(node_id).expect("ready node must exist in graph");
                let executor = self.executor_for(node.node_type);
                async move {
                    let executor = executor?;
                    executor.execute(node_id, graph, state).await
                }
            });
            let results = join_all(futures).await;

            for (node_id, result) in ready.into_iter().zip(results) {
                match result {
                    Ok(NodeOutcome::Done { output, metadata }) => {
                        state.executed_nodes.insert(node_id.clone(), output.clone());
                        let node = graph.node(&node_id).expect("ready node must exist in graph");
                        let agent_name = node.data.name.clone().unwrap_or_else(|| node_id.clone());
                        let agent_type = format!("{:?}", node.node_type);
                        let message_type = match node.node_type {
                            NodeType::StartNode | NodeType::EndNode => "system",
                            _ => "agent_output",
                        };
                        if let Some(metadata) = metadata {
                            state.delegate_conversations.insert(node_id.clone(), metadata);
                        }
                        state.push_message(node_id, agent_name, agent_type, output, message_type);
                    }
                    Ok(NodeOutcome::AwaitingHumanInput { reason }) => {
                        state.status = crate::state::ExecutionStatus::AwaitingHumanInput;
                        state.pending_node = Some(node_id.clone());
                        info!(execution_id = %state.execution_id, node = %node_id, %reason, "pausing for human input");
                        return Ok(());
                    }
                    Err(e) => {
                        state.status = crate::state::ExecutionStatus::Failed;
                        state.error = Some(e.to_string());
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Resume a previously-paused execution: recompute the first ready
    /// node from `executed_nodes` (never trust an in-memory cursor across
    /// the pause boundary) then continue [`Scheduler::run`] from there.
    pub async fn resume(&self, graph: &Graph, state: &mut ExecutionState) -> Result<()> {
        state.status = crate::state::ExecutionStatus::Running;
        state.pending_node = None;
        self.run(graph, state).await
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
