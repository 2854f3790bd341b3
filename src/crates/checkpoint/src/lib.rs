//! # checkpoint - execution persistence
//!
//! A narrow persistence abstraction for the agent workflow orchestrator:
//! one [`state::ExecutionState`] row per run, behind the [`traits::ExecutionStore`]
//! trait, with an [`memory::InMemoryExecutionStore`] implementation for
//! tests and single-process use. `orchestrator::db` supplies the
//! SQLite-backed implementation used by the server binary.

pub mod error;
pub mod memory;
pub mod state;
pub mod traits;

pub use error::{CheckpointError, Result};
pub use memory::InMemoryExecutionStore;
pub use state::{ExecutionState, ExecutionStatus, MessageEntry};
pub use traits::ExecutionStore;
