//! Request/response bodies for the execution-control REST surface
//! (spec.md §6). Template storage being out of scope, `POST /executions`
//! carries the graph inline rather than a `workflow_id` referencing a
//! pre-registered template; `workflow_id` is an optional client-supplied
//! label used only to key [`crate::workflow_store::WorkflowStore`] so a
//! later `POST /human-input/submit` can recall the same graph.

use chrono::{DateTime, Utc};
use graph_core::graph::Graph;
use graph_core::state::{ExecutionState, ExecutionStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::human_input::ResumeAction;

#[derive(Debug, Deserialize)]
pub struct SubmitExecutionRequest {
    pub graph: Graph,
    pub input: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitExecutionResponse {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
}

impl From<&ExecutionState> for SubmitExecutionResponse {
    fn from(state: &ExecutionState) -> Self {
        Self { execution_id: state.execution_id, status: state.status }
    }
}

#[derive(Debug, Deserialize)]
pub struct HumanInputSubmitRequest {
    pub execution_id: Uuid,
    pub human_input: String,
    #[serde(default = "default_submit_action")]
    pub action: ResumeAction,
}

fn default_submit_action() -> ResumeAction {
    ResumeAction::Submit
}

/// One entry in `GET /human-input/pending`: just enough for a caller to
/// decide which execution to act on without fetching the full snapshot.
#[derive(Debug, Serialize)]
pub struct PendingHumanInputEntry {
    pub execution_id: Uuid,
    pub workflow_id: Option<String>,
    pub agent_name: Option<String>,
    pub primary_input: Option<String>,
    pub requested_at: Option<DateTime<Utc>>,
}

impl From<&ExecutionState> for PendingHumanInputEntry {
    fn from(state: &ExecutionState) -> Self {
        Self {
            execution_id: state.execution_id,
            workflow_id: state.workflow_id.clone(),
            agent_name: state.human_input_context.as_ref().and_then(|c| c.agent_name.clone()),
            primary_input: state.human_input_context.as_ref().and_then(|c| c.primary_input.clone()),
            requested_at: state.human_input_requested_at,
        }
    }
}
