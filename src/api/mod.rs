//! HTTP management API.
//!
//! A thin axum wrapper over the management service: task CRUD, lifecycle
//! controls, execution history, and diagnostics.

mod errors;
mod handlers;
mod responses;

pub use errors::{ApiError, ErrorResponse};
pub use handlers::ApiState;
pub use responses::*;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::service::TaskService;

/// Build the API router with all endpoints.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        // Health check
        .route("/api/health", get(handlers::health))
        // Tasks
        .route(
            "/api/tasks",
            get(handlers::list_tasks).post(handlers::create_task),
        )
        .route(
            "/api/tasks/by-name/{name}",
            get(handlers::get_task_by_name),
        )
        .route(
            "/api/tasks/{task_id}",
            get(handlers::get_task)
                .patch(handlers::update_task)
                .delete(handlers::delete_task),
        )
        // Lifecycle controls
        .route("/api/tasks/{task_id}/pause", post(handlers::pause_task))
        .route("/api/tasks/{task_id}/resume", post(handlers::resume_task))
        .route("/api/tasks/{task_id}/run", post(handlers::run_task))
        .route(
            "/api/tasks/{task_id}/retries/reset",
            post(handlers::reset_retries),
        )
        // Execution history
        .route(
            "/api/tasks/{task_id}/executions",
            get(handlers::task_executions),
        )
        // Diagnostics
        .route("/api/diagnostics/stuck", get(handlers::stuck_tasks))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Create the API state from the management service.
pub fn create_api_state(service: Arc<TaskService>) -> ApiState {
    ApiState { service }
}

/// Start the API server.
///
/// Spawns the server and returns a handle to the task. The server runs
/// until the task is aborted or the process exits.
pub async fn start_server(
    config: &ServerConfig,
    state: ApiState,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let router = build_router(state);
    let addr = config.socket_addr()?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("API server listening on http://{}", addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(handle)
}
