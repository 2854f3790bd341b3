//! Workflow graph data structures: [`Graph`], [`Node`], [`Edge`].
//!
//! A workflow [`Graph`] is the fixed JSON-deserializable shape a client
//! submits for execution: a flat list of nodes tagged by [`NodeType`], and
//! a flat list of typed [`Edge`]s connecting them. Unlike a generic
//! state-reducer graph, node configuration here is a single struct with
//! optional fields (see [`NodeConfig`]) rather than a trait object, since
//! the whole graph crosses a JSON boundary and must round-trip losslessly.
//!
//! # Example
//!
//! ```rust
//! use graph_core::graph::{Graph, Node, NodeType, NodeConfig, Edge, EdgeType};
//!
//! let graph = Graph {
//!     nodes: vec![
//!         Node { id: "start".into(), node_type: NodeType::StartNode, data: NodeConfig::default() },
//!         Node { id: "assistant".into(), node_type: NodeType::AssistantAgent, data: NodeConfig::default() },
//!         Node { id: "end".into(), node_type: NodeType::EndNode, data: NodeConfig::default() },
//!     ],
//!     edges: vec![
//!         Edge { source: "start".into(), target: "assistant".into(), edge_type: EdgeType::Sequential },
//!         Edge { source: "assistant".into(), target: "end".into(), edge_type: EdgeType::Sequential },
//!     ],
//! };
//!
//! assert!(graph.validate().is_ok());
//! ```

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// Stable identifier for a node within a [`Graph`]. Node ids are unique;
/// node *names* (in [`NodeConfig::name`]) are not, and must never be used
/// to key persisted state.
pub type NodeId = String;

/// The kind of agent or control node a [`Node`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum NodeType {
    /// Single graph entry point. Exactly one per graph.
    StartNode,
    /// Graph exit point. One or more per graph.
    EndNode,
    /// Ordinary LLM-backed agent executed directly by the scheduler.
    AssistantAgent,
    /// An agent that only ever runs as a delegate of a [`NodeType::GroupChatManager`].
    DelegateAgent,
    /// Orchestrates a set of `DelegateAgent` nodes via round-robin or
    /// intelligent delegation (see `orchestrator::gcm`).
    GroupChatManager,
    /// A human-in-the-loop checkpoint, optionally feeding a reflection loop.
    UserProxyAgent,
}

/// Configuration carried by a [`Node`]. Kept as one struct with optional
/// fields, rather than a per-`NodeType` enum, because the graph is
/// deserialized from client-submitted JSON where unknown/absent fields
/// must not become a parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Human-readable label. Not unique - never used as a storage key.
    #[serde(default)]
    pub name: Option<String>,
    /// System prompt / role instructions for an agent node.
    #[serde(default)]
    pub system_message: Option<String>,
    /// LLM provider identifier (resolved via the credential store).
    #[serde(default)]
    pub llm_provider: Option<String>,
    /// Model name passed through to the LLM provider.
    #[serde(default)]
    pub llm_model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Round-robin mode: exact-suffix string that marks a delegate's turn
    /// as complete once its response ends with it.
    #[serde(default)]
    pub termination_condition: Option<String>,
    /// `GroupChatManager` only: per-delegate cap on conversation rounds.
    /// Preferred over `max_rounds` when both are set.
    #[serde(default)]
    pub max_iterations: Option<u32>,
    /// `GroupChatManager` only: cap on the number of round-robin rounds.
    #[serde(default)]
    pub max_rounds: Option<u32>,
    /// `GroupChatManager` only: `"round_robin"` or `"intelligent"`.
    #[serde(default)]
    pub delegation_mode: Option<String>,
    /// `GroupChatManager` only: `all_delegates_complete`,
    /// `any_delegate_complete`, or `max_iterations_reached`.
    #[serde(default)]
    pub termination_strategy: Option<String>,
    /// Minimum match confidence before falling back to full broadcast.
    #[serde(default)]
    pub delegation_confidence_threshold: Option<f32>,
    /// Delegate execution: per-attempt wall clock budget in seconds.
    #[serde(default)]
    pub delegation_timeout_s: Option<u64>,
    /// Delegate execution: retry attempts beyond the first.
    #[serde(default)]
    pub max_delegation_retries: Option<u32>,
    /// Intelligent mode: cap on the number of subqueries query-split may
    /// produce; excess is truncated by priority.
    #[serde(default)]
    pub max_subqueries: Option<usize>,
    /// `UserProxyAgent` only: block the scheduler until input arrives.
    #[serde(default)]
    pub require_human_input: Option<bool>,
    /// Content filter ids (`folder_<path>` / `file_<doc_id>`) scoping
    /// document retrieval for this node, or `None` to skip it.
    #[serde(default)]
    pub doc_aware: Option<bool>,
    #[serde(default)]
    pub search_method: Option<String>,
    #[serde(default)]
    pub search_parameters: Option<serde_json::Value>,
    #[serde(default)]
    pub content_filters: Option<Vec<String>>,
    /// `DelegateAgent` only: used by query-analysis delegate matching.
    #[serde(default)]
    pub description: Option<String>,
}

/// A single node in a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub data: NodeConfig,
}

/// The relationship an [`Edge`] expresses between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Ordinary control-flow dependency: target runs after source completes.
    Sequential,
    /// Connects a `GroupChatManager` to one of its `DelegateAgent`s.
    /// Undirected in practice - the scheduler does not treat a delegate
    /// edge as a dependency for scheduling purposes.
    Delegate,
    /// Connects a node back to a `UserProxyAgent` for a reflection loop.
    Reflection,
}

/// A directed connection between two [`Node`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
}

/// A complete workflow graph as submitted by a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Nodes reachable from `node` via an edge of the given type, outgoing only.
    pub fn successors(&self, node: &str, edge_type: EdgeType) -> Vec<&NodeId> {
        self.edges
            .iter()
            .filter(|e| e.source == node && e.edge_type == edge_type)
            .map(|e| &e.target)
            .collect()
    }

    /// Nodes connected to `node` by a [`EdgeType::Delegate`] edge, scanned in
    /// either direction - the group chat manager may be listed as source or
    /// target depending on how the client authored the graph.
    pub fn delegates_of(&self, gcm_id: &str) -> Vec<&NodeId> {
        self.edges
            .iter()
            .filter(|e| e.edge_type == EdgeType::Delegate)
            .filter_map(|e| {
                if e.source == gcm_id {
                    Some(&e.target)
                } else if e.target == gcm_id {
                    Some(&e.source)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Ids of nodes whose completion `node` sequentially depends on, plus
    /// reflection edges whose target is a human-input-requiring
    /// `UserProxyAgent`. Delegate edges never contribute a scheduling
    /// dependency: delegation is managed entirely inside the
    /// `GroupChatManager` node. A reflection edge into a `UserProxyAgent`
    /// that doesn't require human input is likewise not a dependency - that
    /// node proceeds on its own schedule rather than waiting on the
    /// reflection source.
    pub fn dependencies_of(&self, node: &str) -> HashSet<&NodeId> {
        let requires_human_input = self
            .node(node)
            .map(|n| n.node_type == NodeType::UserProxyAgent && n.data.require_human_input.unwrap_or(false))
            .unwrap_or(false);

        self.edges
            .iter()
            .filter(|e| {
                e.target == node
                    && match e.edge_type {
                        EdgeType::Delegate => false,
                        EdgeType::Sequential => true,
                        EdgeType::Reflection => requires_human_input,
                    }
            })
            .map(|e| &e.source)
            .collect()
    }

    /// Structural validation: exactly one start node, at least one end
    /// node, every edge endpoint resolves to a known node id, and every
    /// non-start node is reachable from the start node by some sequential
    /// or reflection edge path.
    pub fn validate(&self) -> Result<()> {
        let ids: HashSet<&NodeId> = self.nodes.iter().map(|n| &n.id).collect();
        if ids.len() != self.nodes.len() {
            return Err(GraphError::Validation("duplicate node id".into()));
        }

        let starts: Vec<&Node> = self
            .nodes
            .iter()
            .filter(|n| n.node_type == NodeType::StartNode)
            .collect();
        if starts.len() != 1 {
            return Err(GraphError::Validation(format!(
                "graph must have exactly one StartNode, found {}",
                starts.len()
            )));
        }
        if !self.nodes.iter().any(|n| n.node_type == NodeType::EndNode) {
            return Err(GraphError::Validation(
                "graph must have at least one EndNode".into(),
            ));
        }

        for edge in &self.edges {
            if !ids.contains(&edge.source) {
                return Err(GraphError::Validation(format!(
                    "edge references unknown source node '{}'",
                    edge.source
                )));
            }
            if !ids.contains(&edge.target) {
                return Err(GraphError::Validation(format!(
                    "edge references unknown target node '{}'",
                    edge.target
                )));
            }
        }

        let start_id = &starts[0].id;
        let mut reachable: HashSet<&NodeId> = HashSet::new();
        reachable.insert(start_id);
        let mut frontier = vec![start_id];
        while let Some(id) = frontier.pop() {
            for next in self
                .successors(id, EdgeType::Sequential)
                .into_iter()
                .chain(self.successors(id, EdgeType::Reflection))
            {
                if reachable.insert(next) {
                    frontier.push(next);
                }
            }
        }
        for node in &self.nodes {
            if node.node_type != NodeType::DelegateAgent && !reachable.contains(&node.id) {
                return Err(GraphError::Validation(format!(
                    "node '{}' is unreachable from the start node",
                    node.id
                )));
            }
        }

        Ok(())
    }

    /// Map of node id -> ids it depends on, for every non-delegate node.
    /// Delegates are intentionally excluded: their execution is driven by
    /// the owning `GroupChatManager`, not the top-level scheduler.
    pub fn dependency_map(&self) -> HashMap<NodeId, HashSet<NodeId>> {
        self.nodes
            .iter()
            .filter(|n| n.node_type != NodeType::DelegateAgent)
            .map(|n| {
                (
                    n.id.clone(),
                    self.dependencies_of(&n.id).into_iter().cloned().collect(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, t: NodeType) -> Node {
        Node {
            id: id.into(),
            node_type: t,
            data: NodeConfig::default(),
        }
    }

    fn edge(s: &str, t: &str, ty: EdgeType) -> Edge {
        Edge {
            source: s.into(),
            target: t.into(),
            edge_type: ty,
        }
    }

    #[test]
    fn validates_a_minimal_graph() {
        let g = Graph {
            nodes: vec![
                node("start", NodeType::StartNode),
                node("a", NodeType::AssistantAgent),
                node("end", NodeType::EndNode),
            ],
            edges: vec![
                edge("start", "a", EdgeType::Sequential),
                edge("a", "end", EdgeType::Sequential),
            ],
        };
        assert!(g.validate().is_ok());
    }

    #[test]
    fn rejects_missing_start_node() {
        let g = Graph {
            nodes: vec![node("end", NodeType::EndNode)],
            edges: vec![],
        };
        assert!(g.validate().is_err());
    }

    #[test]
    fn rejects_dangling_edge() {
        let g = Graph {
            nodes: vec![node("start", NodeType::StartNode), node("end", NodeType::EndNode)],
            edges: vec![edge("start", "ghost", EdgeType::Sequential)],
        };
        assert!(g.validate().is_err());
    }

    #[test]
    fn delegate_edges_are_excluded_from_dependencies() {
        let g = Graph {
            nodes: vec![
                node("start", NodeType::StartNode),
                node("gcm", NodeType::GroupChatManager),
                node("d1", NodeType::DelegateAgent),
                node("end", NodeType::EndNode),
            ],
            edges: vec![
                edge("start", "gcm", EdgeType::Sequential),
                edge("gcm", "d1", EdgeType::Delegate),
                edge("gcm", "end", EdgeType::Sequential),
            ],
        };
        assert!(g.dependencies_of("d1").is_empty());
        assert_eq!(g.delegates_of("gcm"), vec!["d1"]);
    }

    #[test]
    fn reflection_edge_is_a_dependency_only_for_human_input_proxies() {
        let mut blocking_proxy = node("proxy", NodeType::UserProxyAgent);
        blocking_proxy.data.require_human_input = Some(true);
        let mut passthrough_proxy = node("proxy2", NodeType::UserProxyAgent);
        passthrough_proxy.data.require_human_input = Some(false);

        let g = Graph {
            nodes: vec![
                node("start", NodeType::StartNode),
                node("a", NodeType::AssistantAgent),
                blocking_proxy,
                passthrough_proxy,
                node("end", NodeType::EndNode),
            ],
            edges: vec![
                edge("start", "a", EdgeType::Sequential),
                edge("a", "proxy", EdgeType::Reflection),
                edge("a", "proxy2", EdgeType::Reflection),
                edge("proxy", "end", EdgeType::Sequential),
                edge("proxy2", "end", EdgeType::Sequential),
            ],
        };

        assert_eq!(
            g.dependencies_of("proxy").into_iter().collect::<Vec<_>>(),
            vec!["a"]
        );
        assert!(g.dependencies_of("proxy2").is_empty());
    }
}
