//! Storage abstraction for persisting tasks.
//!
//! Trait-based task store with pluggable backends (in-memory, SQLite).
//! The store is the single source of truth; all mutation is per-task
//! document updates.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::task::{Task, TaskStatus};
use crate::core::types::TaskId;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested task was not found.
    #[error("task not found: {0}")]
    NotFound(String),

    /// A task with the same name already exists.
    #[error("task name already exists: {0}")]
    DuplicateName(String),

    /// Storage lock was poisoned.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic storage error.
    #[error("storage error: {0}")]
    Other(String),
}

/// Field to sort task listings by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Name,
    NextRun,
    CreatedAt,
    UpdatedAt,
    Status,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    Desc,
}

/// Filtered, sorted, paginated task query.
#[derive(Debug, Clone)]
pub struct ListQuery {
    /// Number of tasks to skip.
    pub skip: usize,
    /// Maximum number of tasks to return.
    pub limit: usize,
    /// Optional status filter.
    pub status: Option<TaskStatus>,
    /// Sort field.
    pub sort: SortField,
    /// Sort direction.
    pub dir: SortDir,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: 50,
            status: None,
            sort: SortField::NextRun,
            dir: SortDir::Asc,
        }
    }
}

/// One page of a task listing.
///
/// `total` is counted with a separate query over the same filter, so it may
/// be momentarily stale under concurrent writes.
#[derive(Debug, Clone, Serialize)]
pub struct TaskPage {
    pub items: Vec<Task>,
    pub total: usize,
    pub skip: usize,
    pub limit: usize,
}

/// Persistent store for tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task. Fails with [`StorageError::DuplicateName`] if a
    /// task with the same name exists.
    async fn create(&self, task: Task) -> Result<Task, StorageError>;

    /// Fetch a task by id.
    async fn get(&self, id: &TaskId) -> Result<Task, StorageError>;

    /// Fetch a task by its unique name.
    async fn get_by_name(&self, name: &str) -> Result<Option<Task>, StorageError>;

    /// Replace a task document. The caller is responsible for bumping
    /// `updated_at` (see [`Task::touch`]).
    async fn update(&self, task: Task) -> Result<Task, StorageError>;

    /// Delete a task by id.
    async fn delete(&self, id: &TaskId) -> Result<(), StorageError>;

    /// Filtered, sorted, paginated listing.
    async fn list(&self, query: &ListQuery) -> Result<TaskPage, StorageError>;

    /// Tasks eligible for dispatch: status `active` or `retry-scheduled`
    /// with `next_run <= now`, ascending by `next_run`, capped at `limit`.
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Task>, StorageError>;

    /// Atomically transition a task from `active`/`retry-scheduled` to
    /// `running` and return the claimed document. Returns `Ok(None)` when
    /// the task is missing or not claimable. This is the lease that keeps
    /// a due task from being dispatched twice by overlapping pollers.
    async fn claim(&self, id: &TaskId) -> Result<Option<Task>, StorageError>;

    /// Tasks stuck in `running` whose last modification predates `cutoff`.
    async fn running_since_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Task>, StorageError>;
}
