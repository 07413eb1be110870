//! Management operations over tasks.
//!
//! The surface a thin HTTP layer wraps: create, read, update, delete,
//! pause/resume, manual execution, retry reset, listing, and execution
//! history. Validation and conflict detection live here so every caller
//! gets the same error taxonomy.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::core::retry::RetryPolicy;
use crate::core::schedule::parse_schedule;
use crate::core::task::{Execution, Task, TaskKind, TaskStatus};
use crate::core::types::TaskId;
use crate::dispatch::email;
use crate::runner::TaskRunner;
use crate::storage::{ListQuery, SortDir, SortField, StorageError, TaskPage, TaskStore};

/// Largest page size a listing will return.
const MAX_PAGE_SIZE: usize = 200;

/// Default number of executions returned by the history endpoint.
const DEFAULT_EXECUTION_LIMIT: usize = 10;

/// Errors surfaced by management operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The task does not exist.
    #[error("task not found: {0}")]
    NotFound(String),

    /// The operation conflicts with current state (duplicate name,
    /// invalid status transition).
    #[error("{0}")]
    Conflict(String),

    /// The request is malformed (bad schedule, missing params).
    #[error("{0}")]
    Validation(String),

    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => ServiceError::NotFound(msg),
            StorageError::DuplicateName(name) => {
                ServiceError::Conflict(format!("task name already exists: {name}"))
            }
            other => ServiceError::Storage(other),
        }
    }
}

/// Request to create a task.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    /// Unique task name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// What to execute.
    pub kind: TaskKind,
    /// Schedule expression (supported cron shape or `"now"`).
    pub schedule: String,
    /// Maximum retries after a failure.
    #[serde(default)]
    pub max_retries: u32,
    /// Fixed delay between retries, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_retry_delay_ms() -> u64 {
    60_000
}

/// Partial update of a task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskRequest {
    /// New unique name.
    #[serde(default)]
    pub name: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// New execution kind.
    #[serde(default)]
    pub kind: Option<TaskKind>,
    /// New schedule expression; re-derives the scheduling fields and
    /// reactivates terminal tasks.
    #[serde(default)]
    pub schedule: Option<String>,
    /// New retry cap.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// New retry delay in milliseconds.
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
}

/// Parameters for listing tasks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTasksRequest {
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub sort: Option<SortField>,
    #[serde(default)]
    pub dir: Option<SortDir>,
}

/// Validate kind-specific parameters.
fn validate_kind(kind: &TaskKind) -> Result<(), ServiceError> {
    match kind {
        TaskKind::Script { handler, .. } => {
            if handler.trim().is_empty() {
                return Err(ServiceError::Validation(
                    "script tasks require a handler".to_string(),
                ));
            }
        }
        TaskKind::Webhook { params } => {
            let url = Url::parse(&params.url).map_err(|e| {
                ServiceError::Validation(format!("invalid webhook url: {e}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ServiceError::Validation(format!(
                    "unsupported webhook scheme: {}",
                    url.scheme()
                )));
            }
        }
        TaskKind::Email { params } => {
            email::validate(params)
                .map_err(|e| ServiceError::Validation(e.to_string()))?;
        }
    }
    Ok(())
}

/// Management API over the task store and runner.
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    runner: Arc<TaskRunner>,
}

impl TaskService {
    /// Create a service over the store and runner.
    pub fn new(store: Arc<dyn TaskStore>, runner: Arc<TaskRunner>) -> Self {
        Self { store, runner }
    }

    /// Create a task from a validated request.
    pub async fn create_task(&self, request: CreateTaskRequest) -> Result<Task, ServiceError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::Validation("task name is required".to_string()));
        }
        validate_kind(&request.kind)?;

        let schedule = request.schedule.trim().to_string();
        let spec = parse_schedule(&schedule, chrono::Utc::now())
            .map_err(|e| ServiceError::Validation(format!("invalid schedule: {e}")))?;

        let retry = RetryPolicy::fixed(
            request.max_retries,
            Duration::from_millis(request.retry_delay_ms),
        );
        let task = Task::new(name, request.description, request.kind, schedule, spec, retry);

        Ok(self.store.create(task).await?)
    }

    /// Fetch a task by id.
    pub async fn get_task(&self, id: &TaskId) -> Result<Task, ServiceError> {
        Ok(self.store.get(id).await?)
    }

    /// Fetch a task by name.
    pub async fn get_task_by_name(&self, name: &str) -> Result<Option<Task>, ServiceError> {
        Ok(self.store.get_by_name(name).await?)
    }

    /// Apply a partial update.
    pub async fn update_task(
        &self,
        id: &TaskId,
        request: UpdateTaskRequest,
    ) -> Result<Task, ServiceError> {
        let mut task = self.store.get(id).await?;

        if let Some(name) = request.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ServiceError::Validation("task name is required".to_string()));
            }
            if name != task.name {
                if let Some(existing) = self.store.get_by_name(&name).await? {
                    if existing.id != task.id {
                        return Err(ServiceError::Conflict(format!(
                            "task name already exists: {name}"
                        )));
                    }
                }
                task.name = name;
            }
        }

        if let Some(description) = request.description {
            task.description = Some(description);
        }

        if let Some(kind) = request.kind {
            validate_kind(&kind)?;
            task.kind = kind;
        }

        if let Some(schedule) = request.schedule {
            let spec = parse_schedule(&schedule, chrono::Utc::now())
                .map_err(|e| ServiceError::Validation(format!("invalid schedule: {e}")))?;
            task.apply_schedule(schedule.trim(), spec);
        }

        if let Some(max_retries) = request.max_retries {
            task.retry.max_retries = max_retries;
        }
        if let Some(delay_ms) = request.retry_delay_ms {
            task.retry.delay = Duration::from_millis(delay_ms);
        }

        task.touch();
        Ok(self.store.update(task).await?)
    }

    /// Delete a task.
    pub async fn delete_task(&self, id: &TaskId) -> Result<(), ServiceError> {
        Ok(self.store.delete(id).await?)
    }

    /// Pause an active task, excluding it from polling.
    pub async fn pause_task(&self, id: &TaskId) -> Result<Task, ServiceError> {
        let mut task = self.store.get(id).await?;
        match task.status {
            TaskStatus::Active | TaskStatus::RetryScheduled => {
                task.status = TaskStatus::Paused;
                task.touch();
                Ok(self.store.update(task).await?)
            }
            TaskStatus::Paused => Err(ServiceError::Conflict(format!(
                "task {} is already paused",
                task.name
            ))),
            other => Err(ServiceError::Conflict(format!(
                "cannot pause task {} in status {other}",
                task.name
            ))),
        }
    }

    /// Resume a paused task.
    ///
    /// An overdue `next_run` is left alone: the task fires once on the next
    /// poll and the post-success recompute skips whatever was missed.
    pub async fn resume_task(&self, id: &TaskId) -> Result<Task, ServiceError> {
        let mut task = self.store.get(id).await?;
        match task.status {
            TaskStatus::Paused => {
                task.status = TaskStatus::Active;
                task.touch();
                Ok(self.store.update(task).await?)
            }
            other => Err(ServiceError::Conflict(format!(
                "cannot resume task {} in status {other}",
                task.name
            ))),
        }
    }

    /// Execute a task immediately. Returns whether it actually ran.
    pub async fn run_task_now(&self, id: &TaskId) -> Result<bool, ServiceError> {
        // Surface a 404 before attempting the claim.
        self.store.get(id).await?;
        Ok(self.runner.run_now(id).await?)
    }

    /// Clear retry bookkeeping. Terminal tasks stay terminal; re-schedule
    /// via [`Self::update_task`] to revive one.
    pub async fn reset_retry_count(&self, id: &TaskId) -> Result<Task, ServiceError> {
        let mut task = self.store.get(id).await?;
        task.retry_count = 0;
        task.last_retry = None;
        task.touch();
        Ok(self.store.update(task).await?)
    }

    /// Filtered, sorted, paginated listing.
    pub async fn list_tasks(&self, request: ListTasksRequest) -> Result<TaskPage, ServiceError> {
        let defaults = ListQuery::default();
        let query = ListQuery {
            skip: request.skip,
            limit: request.limit.unwrap_or(defaults.limit).clamp(1, MAX_PAGE_SIZE),
            status: request.status,
            sort: request.sort.unwrap_or(defaults.sort),
            dir: request.dir.unwrap_or(defaults.dir),
        };
        Ok(self.store.list(&query).await?)
    }

    /// Recent executions of a task, newest first.
    pub async fn task_executions(
        &self,
        id: &TaskId,
        limit: Option<usize>,
    ) -> Result<Vec<Execution>, ServiceError> {
        let task = self.store.get(id).await?;
        let limit = limit.unwrap_or(DEFAULT_EXECUTION_LIMIT);
        Ok(task.history.iter().rev().take(limit).cloned().collect())
    }

    /// Tasks stuck in `running` past the configured threshold.
    pub async fn stuck_tasks(&self) -> Result<Vec<Task>, ServiceError> {
        Ok(self.runner.stuck_tasks().await?)
    }
}
