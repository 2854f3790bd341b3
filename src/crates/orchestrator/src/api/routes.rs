//! Route table and shared application state.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::workflow_store::WorkflowStore;

use super::handlers;

/// Shared application state threaded through every handler via axum's
/// `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub workflows: Arc<dyn WorkflowStore>,
}

/// Build the complete router for the execution-control surface described
/// in spec.md §6.
pub fn create_router(engine: Arc<Engine>, workflows: Arc<dyn WorkflowStore>) -> Router {
    let state = AppState { engine, workflows };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/executions", post(handlers::submit_execution))
        .route("/executions/:id", get(handlers::get_execution))
        .route("/human-input/pending", get(handlers::list_pending_human_input))
        .route("/human-input/submit", post(handlers::submit_human_input))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
