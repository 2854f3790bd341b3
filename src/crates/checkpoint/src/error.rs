//! Error types for execution-store operations.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CheckpointError>;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("execution not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),

    /// Raised by `try_claim_resume` when another writer already claimed
    /// the execution's resume slot (the `AwaitingHumanInput -> Running`
    /// transition is allowed to happen exactly once per pause).
    #[error("execution {0} is not awaiting human input")]
    NotAwaitingInput(String),

    #[error("{0}")]
    Custom(String),
}
