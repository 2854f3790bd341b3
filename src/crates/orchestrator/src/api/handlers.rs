//! Route handlers. Each one does the minimum request/response shaping
//! around a single [`crate::engine::Engine`] call.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

use graph_core::state::ExecutionState;

use super::error::{ApiError, ApiResult};
use super::models::{HumanInputSubmitRequest, PendingHumanInputEntry, SubmitExecutionRequest, SubmitExecutionResponse};
use super::response;
use super::routes::AppState;
use crate::human_input::ResumeRequest;

pub async fn health() -> impl IntoResponse {
    response::ok(serde_json::json!({ "status": "ok" }))
}

/// `POST /executions`: submit a graph for execution. The graph is stashed
/// under the fresh `execution_id` so a later `POST /human-input/submit` can
/// recall it - see `crate::workflow_store`.
pub async fn submit_execution(
    State(app): State<AppState>,
    Json(req): Json<SubmitExecutionRequest>,
) -> ApiResult<impl IntoResponse> {
    let project_id = req.project_id.unwrap_or_default();
    let state = app
        .engine
        .submit(&req.graph, req.input, project_id, req.workflow_id)
        .await
        .map_err(ApiError::from)?;
    app.workflows.save_graph(&state.execution_id.to_string(), &req.graph).await.map_err(ApiError::from)?;
    Ok(response::created(SubmitExecutionResponse::from(&state)))
}

/// `GET /executions/{id}`: the full persisted snapshot.
pub async fn get_execution(State(app): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<ExecutionState>> {
    let state = app
        .engine
        .store()
        .load(id)
        .await
        .map_err(crate::error::OrchestratorError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("execution {id}")))?;
    Ok(Json(state))
}

/// `GET /human-input/pending`: every execution currently paused for human
/// input, across all projects - a host fronting this API with per-caller
/// auth is expected to filter by `project_id` itself (see spec.md §1,
/// credential/auth administration is out of scope for this core).
pub async fn list_pending_human_input(State(app): State<AppState>) -> ApiResult<Json<Vec<PendingHumanInputEntry>>> {
    let pending = app.engine.store().list_awaiting_human_input().await.map_err(crate::error::OrchestratorError::from)?;
    Ok(Json(pending.iter().map(PendingHumanInputEntry::from).collect()))
}

/// `POST /human-input/submit`: recall the graph the execution was
/// submitted with, then hand off to [`crate::engine::Engine::resume`].
pub async fn submit_human_input(
    State(app): State<AppState>,
    Json(req): Json<HumanInputSubmitRequest>,
) -> ApiResult<Json<ExecutionState>> {
    let graph = app
        .workflows
        .load_graph(&req.execution_id.to_string())
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("no stored graph for execution {}", req.execution_id)))?;

    let resumed = app
        .engine
        .resume(&graph, ResumeRequest { execution_id: req.execution_id, human_input: req.human_input, action: req.action })
        .await
        .map_err(ApiError::from)?;
    Ok(Json(resumed))
}
