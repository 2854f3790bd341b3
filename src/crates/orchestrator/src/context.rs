//! Input aggregation for a node with more than one incoming edge.
//!
//! A node's [`graph_core::graph::Graph::dependencies_of`] may return more
//! than one source - two assistants feeding the same `GroupChatManager`,
//! say. [`aggregate`] turns the executed outputs of those sources into a
//! single [`AggregatedContext`] a prompt builder can splice in directly,
//! without needing to know how many inputs actually fed the node.

use graph_core::graph::Graph;
use graph_core::state::ExecutionState;

/// One input beyond the first, identified by its source node's display name.
#[derive(Debug, Clone)]
pub struct SecondaryInput {
    pub name: String,
    pub content: String,
}

/// The combined view of every input feeding a node, built once per node
/// execution from `executed_nodes`.
#[derive(Debug, Clone)]
pub struct AggregatedContext {
    pub input_count: usize,
    pub primary_input: String,
    pub secondary_inputs: Vec<SecondaryInput>,
    /// Short human-readable summary, e.g. `"3 input sources processed"`.
    pub input_summary: String,
    /// All inputs concatenated in order, primary first.
    pub combined_text: String,
    /// Multi-paragraph rendering suitable for direct inclusion in an LLM
    /// prompt - labels each input by its source node's name.
    pub formatted_context: String,
}

/// Collect `dependencies_of(node_id)`'s outputs from `state.executed_nodes`,
/// in the order the graph lists them, and fold them into an
/// [`AggregatedContext`]. The first dependency encountered becomes
/// `primary_input`; the rest become `secondary_inputs`. A node with no
/// executed dependencies (the entry point right after `StartNode`) gets an
/// empty context with `input_count == 0`.
pub fn aggregate(graph: &Graph, node_id: &str, state: &ExecutionState) -> AggregatedContext {
    let mut sources: Vec<&String> = graph.dependencies_of(node_id).into_iter().collect();
    sources.sort();

    let mut inputs: Vec<(String, String)> = Vec::new();
    for source_id in sources {
        if let Some(content) = state.executed_nodes.get(source_id) {
            let name = graph
                .node(source_id)
                .and_then(|n| n.data.name.clone())
                .unwrap_or_else(|| source_id.clone());
            inputs.push((name, content.clone()));
        }
    }

    let input_count = inputs.len();
    let primary_input = inputs.first().map(|(_, c)| c.clone()).unwrap_or_default();
    let secondary_inputs: Vec<SecondaryInput> = inputs
        .iter()
        .skip(1)
        .map(|(name, content)| SecondaryInput { name: name.clone(), content: content.clone() })
        .collect();

    let combined_text = inputs
        .iter()
        .map(|(_, content)| content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let input_summary = format!("{input_count} input source{plural} processed", plural = if input_count == 1 { "" } else { "s" });

    let formatted_context = if inputs.is_empty() {
        String::new()
    } else {
        inputs
            .iter()
            .enumerate()
            .map(|(i, (name, content))| format!("[Input {}] {}:\n{}", i + 1, name, content))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    AggregatedContext { input_count, primary_input, secondary_inputs, input_summary, combined_text, formatted_context }
}
