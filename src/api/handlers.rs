//! API request handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::core::task::Task;
use crate::core::types::TaskId;
use crate::service::{CreateTaskRequest, ListTasksRequest, TaskService, UpdateTaskRequest};

use super::errors::ApiError;
use super::responses::{
    ExecutionListResponse, HealthResponse, MessageResponse, RunNowResponse, StuckTasksResponse,
    TaskListResponse,
};

/// Shared application state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<TaskService>,
}

/// Query parameters for the executions endpoint.
#[derive(Debug, Deserialize)]
pub struct ExecutionsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

fn parse_task_id(raw: &str) -> Result<TaskId, ApiError> {
    TaskId::from_string(raw).map_err(|_| ApiError::NotFound(format!("invalid task id: {raw}")))
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Create a task.
pub async fn create_task(
    State(state): State<ApiState>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let task = state.service.create_task(request).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// List tasks.
pub async fn list_tasks(
    State(state): State<ApiState>,
    Query(query): Query<ListTasksRequest>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let page = state.service.list_tasks(query).await?;
    Ok(Json(TaskListResponse::from(page)))
}

/// Get a task by its unique name.
pub async fn get_task_by_name(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .service
        .get_task_by_name(&name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("task not found: {name}")))?;
    Ok(Json(task))
}

/// Get a task by id.
pub async fn get_task(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let id = parse_task_id(&task_id)?;
    let task = state.service.get_task(&id).await?;
    Ok(Json(task))
}

/// Update a task.
pub async fn update_task(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
    Json(request): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    let id = parse_task_id(&task_id)?;
    let task = state.service.update_task(&id, request).await?;
    Ok(Json(task))
}

/// Delete a task.
pub async fn delete_task(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_task_id(&task_id)?;
    state.service.delete_task(&id).await?;
    Ok(Json(MessageResponse {
        message: "task deleted".to_string(),
    }))
}

/// Pause a task.
pub async fn pause_task(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let id = parse_task_id(&task_id)?;
    let task = state.service.pause_task(&id).await?;
    Ok(Json(task))
}

/// Resume a paused task.
pub async fn resume_task(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let id = parse_task_id(&task_id)?;
    let task = state.service.resume_task(&id).await?;
    Ok(Json(task))
}

/// Execute a task immediately.
pub async fn run_task(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
) -> Result<Json<RunNowResponse>, ApiError> {
    let id = parse_task_id(&task_id)?;
    let executed = state.service.run_task_now(&id).await?;
    let message = if executed {
        "task executed".to_string()
    } else {
        "task was not claimable".to_string()
    };
    Ok(Json(RunNowResponse { executed, message }))
}

/// Reset a task's retry bookkeeping.
pub async fn reset_retries(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let id = parse_task_id(&task_id)?;
    let task = state.service.reset_retry_count(&id).await?;
    Ok(Json(task))
}

/// List recent executions of a task.
pub async fn task_executions(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
    Query(query): Query<ExecutionsQuery>,
) -> Result<Json<ExecutionListResponse>, ApiError> {
    let id = parse_task_id(&task_id)?;
    let executions = state.service.task_executions(&id, query.limit).await?;
    let count = executions.len();
    Ok(Json(ExecutionListResponse { executions, count }))
}

/// List tasks stuck in `running`.
pub async fn stuck_tasks(
    State(state): State<ApiState>,
) -> Result<Json<StuckTasksResponse>, ApiError> {
    let tasks = state.service.stuck_tasks().await?;
    let count = tasks.len();
    Ok(Json(StuckTasksResponse { tasks, count }))
}
