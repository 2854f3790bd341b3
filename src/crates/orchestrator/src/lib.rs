//! Orchestration engine for multi-agent workflow graphs: a Group Chat
//! Manager that splits and delegates work across agents, a scheduler-driven
//! pause/resume controller for human-in-the-loop nodes, and a reflection
//! cycle for iterative review.
//!
//! [`engine::Engine`] is the top-level entry point a transport layer
//! (`bin/orchestrator-server.rs`) drives; everything else in this crate is
//! the machinery it wires together.

pub mod api;
pub mod config;
pub mod context;
pub mod credentials;
pub mod db;
pub mod delegate_executor;
pub mod docaware;
pub mod engine;
pub mod error;
pub mod executors;
pub mod gcm;
pub mod human_input;
pub mod protocol;
pub mod providers;
pub mod query_analysis;
pub mod reflection;
pub mod workflow_store;

pub use engine::Engine;
pub use error::OrchestratorError;
