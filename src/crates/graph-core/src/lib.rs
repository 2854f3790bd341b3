//! # graph-core - agent workflow graph execution
//!
//! The execution foundation for the orchestration engine: the workflow
//! [`graph`] data model, the level-by-level [`scheduler`], [`state`] for
//! the single persisted execution record, [`interrupt`] for the
//! pause/resume merge rules, [`retry`] for delegate back-off, and
//! [`error`] for the shared error type.
//!
//! This crate knows nothing about LLMs, delegation, or document
//! retrieval - those live in `orchestrator`, which implements
//! [`scheduler::NodeExecutor`] for each [`graph::NodeType`] and drives the
//! [`scheduler::Scheduler`] against a [`checkpoint::ExecutionStore`].

pub mod error;
pub mod graph;
pub mod interrupt;
pub mod retry;
pub mod scheduler;
pub mod state;

pub use error::{GraphError, Result};
pub use graph::{Edge, EdgeType, Graph, Node, NodeConfig, NodeId, NodeType};
pub use retry::{RetryPolicy, RetryState};
pub use scheduler::{NodeExecutor, NodeOutcome, Scheduler};
pub use state::{ExecutionState, ExecutionStatus, MessageEntry};
