//! REST transport (C5's spec §6 "Execution control (REST, illustrative)"
//! surface), built on `axum`: submit a graph for execution, inspect an
//! execution's snapshot, list paused executions, and deliver human input.
//!
//! This module is a thin translation layer - every handler's real work is
//! already done by [`crate::engine::Engine`]; nothing here touches
//! `ExecutionState` directly beyond reading it back for a response body.

pub mod error;
pub mod handlers;
pub mod models;
pub mod response;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use routes::{create_router, AppState};
