//! Error types for graph construction, scheduling, and node execution.
//!
//! All errors implement `std::error::Error` via `thiserror`.
//!
//! # Error Hierarchy
//!
//! ```text
//! GraphError
//! ├── Validation         - Graph structure errors
//! ├── NodeExecution      - Node execution failures
//! ├── Execution          - General execution errors
//! ├── Interrupted        - Human-in-the-loop pause (not a failure)
//! ├── StateError         - Execution-state errors
//! ├── Checkpoint         - Persistence errors
//! ├── Serialization      - JSON/YAML errors
//! ├── Configuration      - Configuration errors
//! ├── Timeout            - Operation timeouts
//! ├── Scheduling         - Deadlock: no ready nodes, some incomplete
//! └── Custom             - Application-defined errors
//! ```
//!
//! # Examples
//!
//! ```rust
//! use graph_core::error::GraphError;
//!
//! fn handle(err: GraphError) -> String {
//!     match err {
//!         GraphError::Interrupted { node, reason } => {
//!             format!("paused at {node}: {reason}")
//!         }
//!         GraphError::NodeExecution { node, error } => {
//!             format!("node {node} failed: {error}")
//!         }
//!         _ => format!("error: {err}"),
//!     }
//! }
//! ```

use thiserror::Error;

/// Convenience result type using [`GraphError`].
pub type Result<T> = std::result::Result<T, GraphError>;

/// All errors that can occur building or running a workflow graph.
#[derive(Error, Debug)]
pub enum GraphError {
    /// Graph structure validation failed (dangling edge, missing start/end, duplicate id).
    #[error("graph validation failed: {0}")]
    Validation(String),

    /// A node's executor returned an error.
    #[error("node '{node}' execution failed: {error}")]
    NodeExecution {
        /// id of the node that failed
        node: String,
        /// error message from the node
        error: String,
    },

    /// Execution error not attributable to a single node.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Execution paused for human input. Not a failure - the caller should
    /// persist the state and return control, resuming later via the
    /// execution store.
    #[error("execution paused at node '{node}': {reason}")]
    Interrupted {
        /// node awaiting human input
        node: String,
        /// why the pause happened
        reason: String,
    },

    /// Execution-state is malformed or missing required data.
    #[error("state error: {0}")]
    StateError(String),

    /// Persistence backend failed to save or load an execution.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] checkpoint::CheckpointError),

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing failed (workflow graph loaded from a YAML file).
    #[error("yaml parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O failure loading a graph definition or writing a checkpoint file.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration is missing or invalid (e.g. no credential for a provider).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An operation exceeded its allotted time.
    #[error("operation timed out after {duration_ms}ms: {operation}")]
    Timeout {
        /// description of the operation that timed out
        operation: String,
        /// timeout duration in milliseconds
        duration_ms: u64,
    },

    /// No ready nodes remain but the graph is not fully executed - a
    /// dependency cycle or a bug in dependency computation. Fatal.
    #[error("scheduling deadlock: {0}")]
    Scheduling(String),

    /// Application-defined error not covered by the variants above.
    #[error("{0}")]
    Custom(String),
}

impl GraphError {
    /// Build a [`GraphError::NodeExecution`].
    pub fn node_execution(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            error: error.into(),
        }
    }

    /// Build a [`GraphError::Interrupted`].
    pub fn interrupted(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Interrupted {
            node: node.into(),
            reason: reason.into(),
        }
    }
}
