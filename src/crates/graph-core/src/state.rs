//! Re-exports of the persisted execution record.
//!
//! `ExecutionState` is defined in the `checkpoint` crate (the lower-level
//! dependency) rather than here, so that `checkpoint`'s in-memory and
//! SQLite-backed stores do not need to depend back on `graph-core` for the
//! type they persist. This module exists so callers can keep writing
//! `graph_core::state::ExecutionState` / `graph_core::ExecutionState`.

pub use checkpoint::state::{ExecutionState, ExecutionStatus, MessageEntry};
