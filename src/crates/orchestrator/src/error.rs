//! Orchestrator-level error kinds.
//!
//! `Validation`/`Configuration`/`Scheduling` are fatal: they set
//! `status=failed` on the execution. `LlmTransient` is retried by
//! [`crate::delegate_executor`] and only surfaces after retries are
//! exhausted. `Schema` never fails a workflow - it only ever appears as the
//! documented query-analysis fallback, so it exists here mainly so that
//! fallback path can be logged uniformly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("LLM call failed (transient): {0}")]
    LlmTransient(String),

    #[error("LLM call failed (permanent): {0}")]
    LlmPermanent(String),

    #[error("LLM returned malformed schema: {0}")]
    Schema(String),

    #[error("scheduling error: {0}")]
    Scheduling(String),

    #[error(transparent)]
    Credential(#[from] crate::credentials::CredentialError),

    #[error(transparent)]
    Graph(#[from] graph_core::error::GraphError),

    #[error(transparent)]
    Checkpoint(#[from] checkpoint::CheckpointError),

    #[error(transparent)]
    Llm(#[from] llm::LlmError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),

    #[error("{0}")]
    Custom(String),
}

impl OrchestratorError {
    /// The fatal kinds that set `status=failed` rather than surfacing as a
    /// recoverable per-node or per-delegate error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Validation(_)
                | OrchestratorError::Configuration(_)
                | OrchestratorError::Scheduling(_)
                | OrchestratorError::Credential(_)
                | OrchestratorError::Graph(_)
        )
    }
}
