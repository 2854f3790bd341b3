//! Pause/resume primitives for human-in-the-loop nodes.
//!
//! A `UserProxyAgent` with `require_human_input` set stops the scheduler
//! without finishing the run: the execution is persisted with
//! `status = AwaitingHumanInput` and `pending_node` set, and control
//! returns to the caller. Resuming later must not trust anything held in
//! memory from the pausing call - a separate process, or even a separate
//! server instance, may perform the resume. Two things follow from that:
//!
//! - The resume position is *recomputed* from `executed_nodes` and the
//!   graph's dependency map, never read back from a stored "next node"
//!   field (node *names* collide; only node ids plus dependency
//!   satisfaction are authoritative - see [`next_ready_node`]).
//! - Because the storage layer may race a concurrent writer (for example
//!   a second resume request arriving before the first one's save lands),
//!   the resume path refreshes the stored state and merges it with the
//!   in-memory copy rather than blindly overwriting either one. See
//!   [`merge_executed_nodes`] and [`merge_messages_data`].

use std::collections::HashMap;

use crate::graph::{Graph, NodeId, NodeType};
use crate::state::ExecutionState;

/// Find the first node, in declaration order, whose dependencies are all
/// present in `executed_nodes` but which has not itself executed yet.
/// Returns `None` when every node is either executed or blocked - the
/// caller distinguishes "done" from "deadlocked" by checking whether all
/// non-delegate nodes are present in `executed_nodes`.
pub fn next_ready_node<'a>(graph: &'a Graph, executed_nodes: &HashMap<NodeId, String>) -> Option<&'a NodeId> {
    let deps = graph.dependency_map();
    graph
        .nodes
        .iter()
        .filter(|n| n.node_type != NodeType::DelegateAgent)
        .find(|n| {
            !executed_nodes.contains_key(&n.id)
                && deps
                    .get(&n.id)
                    .map(|d| d.iter().all(|dep| executed_nodes.contains_key(dep)))
                    .unwrap_or(true)
        })
        .map(|n| &n.id)
}

/// Merge a freshly-loaded `executed_nodes` map with the caller's local
/// copy. The local copy wins on any key present in both: it reflects work
/// this resume just did, which is always at least as current as whatever
/// another writer persisted before this call started.
pub fn merge_executed_nodes(
    stored: HashMap<NodeId, String>,
    local: HashMap<NodeId, String>,
) -> HashMap<NodeId, String> {
    let mut merged = stored;
    for (k, v) in local {
        merged.insert(k, v);
    }
    merged
}

/// Merge two `messages_data` logs produced by a racing pair of writers.
/// Keeps whichever side (a) ends in a reflection-final marker message, or
/// failing that (b) is longer - both signal "more complete" without
/// requiring the two logs to share a common prefix, since a resume may
/// rebuild entries rather than append to the exact stored list.
pub fn merge_messages_data(stored: &ExecutionState, local: &ExecutionState) -> Vec<crate::state::MessageEntry> {
    if local.ends_in_reflection_final() && !stored.ends_in_reflection_final() {
        local.messages_data.clone()
    } else if stored.ends_in_reflection_final() && !local.ends_in_reflection_final() {
        stored.messages_data.clone()
    } else if local.messages_data.len() >= stored.messages_data.len() {
        local.messages_data.clone()
    } else {
        stored.messages_data.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, EdgeType, Node, NodeConfig};
    use uuid::Uuid;

    fn node(id: &str, t: NodeType) -> Node {
        Node { id: id.into(), node_type: t, data: NodeConfig::default() }
    }

    #[test]
    fn finds_first_ready_node_by_dependency_satisfaction() {
        let g = Graph {
            nodes: vec![
                node("start", NodeType::StartNode),
                node("a", NodeType::AssistantAgent),
                node("b", NodeType::UserProxyAgent),
                node("end", NodeType::EndNode),
            ],
            edges: vec![
                Edge { source: "start".into(), target: "a".into(), edge_type: EdgeType::Sequential },
                Edge { source: "a".into(), target: "b".into(), edge_type: EdgeType::Sequential },
                Edge { source: "b".into(), target: "end".into(), edge_type: EdgeType::Sequential },
            ],
        };
        let mut executed = HashMap::new();
        executed.insert("start".to_string(), String::new());
        executed.insert("a".to_string(), "done".to_string());
        assert_eq!(next_ready_node(&g, &executed), Some(&"b".to_string()));
    }

    #[test]
    fn local_copy_wins_merge_on_conflicting_key() {
        let mut stored = HashMap::new();
        stored.insert("a".to_string(), "stale".to_string());
        let mut local = HashMap::new();
        local.insert("a".to_string(), "fresh".to_string());
        local.insert("b".to_string(), "fresh-b".to_string());
        let merged = merge_executed_nodes(stored, local);
        assert_eq!(merged.get("a").unwrap(), "fresh");
        assert_eq!(merged.get("b").unwrap(), "fresh-b");
    }

    #[test]
    fn reflection_final_marker_wins_merge_regardless_of_length() {
        let mut stored = ExecutionState::new(Uuid::new_v4());
        stored.push_message("a", "A", "AssistantAgent", "one", "agent_output");
        stored.push_message("a", "A", "AssistantAgent", "two", "agent_output");
        stored.push_message("a", "A", "AssistantAgent", "three", "agent_output");

        let mut local = ExecutionState::new(Uuid::new_v4());
        local.push_message("a", "A", "AssistantAgent", "one", "agent_output");
        local.push_message("a", "A", "AssistantAgent", "final", "reflection_final");

        let merged = merge_messages_data(&stored, &local);
        assert_eq!(merged.len(), 2);
        assert!(merged.last().unwrap().is_reflection_final());
    }
}
