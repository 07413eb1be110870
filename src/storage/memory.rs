//! In-memory store implementation.
//!
//! Thread-safe backend for testing and development. Data is not persisted
//! across restarts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{ListQuery, SortDir, SortField, StorageError, TaskPage, TaskStore};
use crate::core::task::{Task, TaskStatus};
use crate::core::types::TaskId;

/// In-memory task store backed by a RwLock map.
pub struct MemoryStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn compare(a: &Task, b: &Task, field: SortField) -> Ordering {
    match field {
        SortField::Name => a.name.cmp(&b.name),
        SortField::NextRun => a.next_run.cmp(&b.next_run),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::Status => a.status.as_str().cmp(b.status.as_str()),
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create(&self, task: Task) -> Result<Task, StorageError> {
        let mut tasks = self.tasks.write().map_err(|_| StorageError::LockPoisoned)?;
        if tasks.values().any(|t| t.name == task.name) {
            return Err(StorageError::DuplicateName(task.name));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn get(&self, id: &TaskId) -> Result<Task, StorageError> {
        let tasks = self.tasks.read().map_err(|_| StorageError::LockPoisoned)?;
        tasks
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Task>, StorageError> {
        let tasks = self.tasks.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tasks.values().find(|t| t.name == name).cloned())
    }

    async fn update(&self, task: Task) -> Result<Task, StorageError> {
        let mut tasks = self.tasks.write().map_err(|_| StorageError::LockPoisoned)?;
        if !tasks.contains_key(&task.id) {
            return Err(StorageError::NotFound(task.id.to_string()));
        }
        if tasks
            .values()
            .any(|t| t.name == task.name && t.id != task.id)
        {
            return Err(StorageError::DuplicateName(task.name));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn delete(&self, id: &TaskId) -> Result<(), StorageError> {
        let mut tasks = self.tasks.write().map_err(|_| StorageError::LockPoisoned)?;
        tasks
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn list(&self, query: &ListQuery) -> Result<TaskPage, StorageError> {
        let tasks = self.tasks.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut filtered: Vec<Task> = tasks
            .values()
            .filter(|t| query.status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        let total = filtered.len();

        filtered.sort_by(|a, b| {
            let ord = compare(a, b, query.sort);
            match query.dir {
                SortDir::Asc => ord,
                SortDir::Desc => ord.reverse(),
            }
        });

        let items = filtered
            .into_iter()
            .skip(query.skip)
            .take(query.limit)
            .collect();

        Ok(TaskPage {
            items,
            total,
            skip: query.skip,
            limit: query.limit,
        })
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Task>, StorageError> {
        let tasks = self.tasks.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut due: Vec<Task> = tasks
            .values()
            .filter(|t| {
                matches!(t.status, TaskStatus::Active | TaskStatus::RetryScheduled)
                    && t.next_run <= now
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| a.next_run.cmp(&b.next_run));
        due.truncate(limit);
        Ok(due)
    }

    async fn claim(&self, id: &TaskId) -> Result<Option<Task>, StorageError> {
        let mut tasks = self.tasks.write().map_err(|_| StorageError::LockPoisoned)?;
        match tasks.get_mut(id) {
            Some(task)
                if matches!(task.status, TaskStatus::Active | TaskStatus::RetryScheduled) =>
            {
                task.status = TaskStatus::Running;
                task.updated_at = Utc::now();
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn running_since_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Task>, StorageError> {
        let tasks = self.tasks.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut stuck: Vec<Task> = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Running && t.updated_at < cutoff)
            .cloned()
            .collect();
        stuck.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(stuck)
    }
}
