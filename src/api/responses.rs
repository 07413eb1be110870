//! API response types.

use serde::Serialize;

use crate::core::task::{Execution, Task};
use crate::storage::TaskPage;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Generic message response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// One page of tasks.
#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub items: Vec<Task>,
    pub total: usize,
    pub skip: usize,
    pub limit: usize,
}

impl From<TaskPage> for TaskListResponse {
    fn from(page: TaskPage) -> Self {
        Self {
            items: page.items,
            total: page.total,
            skip: page.skip,
            limit: page.limit,
        }
    }
}

/// Execution history for a task.
#[derive(Debug, Serialize)]
pub struct ExecutionListResponse {
    pub executions: Vec<Execution>,
    pub count: usize,
}

/// Result of a manual execution request.
#[derive(Debug, Serialize)]
pub struct RunNowResponse {
    pub executed: bool,
    pub message: String,
}

/// Stuck-task diagnostic listing.
#[derive(Debug, Serialize)]
pub struct StuckTasksResponse {
    pub tasks: Vec<Task>,
    pub count: usize,
}
