//! API error taxonomy and its conversion to an HTTP response, mirrored on
//! the teacher's `orchestrator::api::error` module but mapped from
//! [`OrchestratorError`] instead of a task-management `DatabaseError`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::OrchestratorError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    pub code: String,
}

impl ApiErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self { error: error.into(), message: message.into(), code: code.into() }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Orchestrator(e) => orchestrator_status(e),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Orchestrator(e) => orchestrator_code(e),
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::Orchestrator(_) => "OrchestratorError",
        }
    }
}

/// `Validation`/`Configuration`/`Scheduling` reach the client as 400s - they
/// describe a malformed request (bad graph, unresolvable execution, no
/// ready node), not a server fault. Everything else is a 500: an LLM
/// provider or persistence failure that the client couldn't have prevented.
fn orchestrator_status(err: &OrchestratorError) -> StatusCode {
    match err {
        OrchestratorError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        OrchestratorError::Configuration(_) => StatusCode::BAD_REQUEST,
        OrchestratorError::Scheduling(_) => StatusCode::CONFLICT,
        OrchestratorError::Graph(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn orchestrator_code(err: &OrchestratorError) -> &'static str {
    match err {
        OrchestratorError::Validation(_) => "VALIDATION_ERROR",
        OrchestratorError::Configuration(_) => "CONFIGURATION_ERROR",
        OrchestratorError::Scheduling(_) => "SCHEDULING_ERROR",
        OrchestratorError::Graph(_) => "GRAPH_ERROR",
        _ => "INTERNAL_ERROR",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiErrorResponse::new(self.error_type(), self.to_string(), self.code());
        tracing::error!(?status, message = %body.message, "API error");
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError::NotFound("execution".into());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn validation_error_maps_to_422() {
        let err = ApiError::Orchestrator(OrchestratorError::Validation("bad graph".into()));
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn scheduling_error_maps_to_409() {
        let err = ApiError::Orchestrator(OrchestratorError::Scheduling("deadlock".into()));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
