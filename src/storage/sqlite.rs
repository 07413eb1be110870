//! SQLite store implementation.
//!
//! Persistent storage using SQLite with automatic schema migration.
//! Task documents map onto a single `tasks` table; the nested kind,
//! history, and last-execution fields are stored as JSON columns.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::{ListQuery, SortDir, SortField, StorageError, TaskPage, TaskStore};
use crate::core::retry::RetryPolicy;
use crate::core::schedule::ScheduleKind;
use crate::core::task::{Task, TaskStatus};
use crate::core::types::TaskId;

/// SQLite task store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create a database at the given path and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path_str = path.as_ref().to_string_lossy();
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path_str))
            .map_err(|e| StorageError::Other(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory database (useful for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        let schema = include_str!("../../migrations/001_initial_schema.sql");
        sqlx::raw_sql(schema)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(format!("migration failed: {}", e)))?;
        Ok(())
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

const TASK_COLUMNS: &str = "id, name, description, kind, schedule, schedule_kind, next_run, \
     period_ms, recurring, max_retries, retry_delay_ms, retry_count, last_retry, status, \
     history, last_execution, created_at, updated_at";

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now)
}

fn row_to_task(row: &SqliteRow) -> Result<Task, StorageError> {
    let id: String = row
        .try_get("id")
        .map_err(|e| StorageError::Other(e.to_string()))?;
    let id = TaskId::from_string(&id).map_err(|e| StorageError::Serialization(e.to_string()))?;

    let kind_json: String = row
        .try_get("kind")
        .map_err(|e| StorageError::Other(e.to_string()))?;
    let kind = serde_json::from_str(&kind_json)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    let history_json: String = row
        .try_get("history")
        .map_err(|e| StorageError::Other(e.to_string()))?;
    let history = serde_json::from_str(&history_json)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    let last_execution_json: Option<String> = row
        .try_get("last_execution")
        .map_err(|e| StorageError::Other(e.to_string()))?;
    let last_execution = match last_execution_json {
        Some(json) => Some(
            serde_json::from_str(&json)
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
        ),
        None => None,
    };

    let schedule_kind: String = row
        .try_get("schedule_kind")
        .map_err(|e| StorageError::Other(e.to_string()))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| StorageError::Other(e.to_string()))?;

    let get_i64 = |col: &str| -> Result<i64, StorageError> {
        row.try_get::<i64, _>(col)
            .map_err(|e| StorageError::Other(e.to_string()))
    };

    Ok(Task {
        id,
        name: row
            .try_get("name")
            .map_err(|e| StorageError::Other(e.to_string()))?,
        description: row
            .try_get("description")
            .map_err(|e| StorageError::Other(e.to_string()))?,
        kind,
        schedule: row
            .try_get("schedule")
            .map_err(|e| StorageError::Other(e.to_string()))?,
        schedule_kind: ScheduleKind::parse(&schedule_kind).ok_or_else(|| {
            StorageError::Serialization(format!("unknown schedule kind: {schedule_kind}"))
        })?,
        next_run: millis_to_datetime(get_i64("next_run")?),
        period_ms: get_i64("period_ms")?,
        recurring: get_i64("recurring")? != 0,
        retry: RetryPolicy::fixed(
            get_i64("max_retries")? as u32,
            Duration::from_millis(get_i64("retry_delay_ms")? as u64),
        ),
        retry_count: get_i64("retry_count")? as u32,
        last_retry: row
            .try_get::<Option<i64>, _>("last_retry")
            .map_err(|e| StorageError::Other(e.to_string()))?
            .map(millis_to_datetime),
        status: TaskStatus::parse(&status)
            .ok_or_else(|| StorageError::Serialization(format!("unknown status: {status}")))?,
        history,
        last_execution,
        created_at: millis_to_datetime(get_i64("created_at")?),
        updated_at: millis_to_datetime(get_i64("updated_at")?),
    })
}

/// Serialized JSON columns for a task.
struct JsonColumns {
    kind: String,
    history: String,
    last_execution: Option<String>,
}

fn json_columns(task: &Task) -> Result<JsonColumns, StorageError> {
    Ok(JsonColumns {
        kind: serde_json::to_string(&task.kind)
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
        history: serde_json::to_string(&task.history)
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
        last_execution: match &task.last_execution {
            Some(summary) => Some(
                serde_json::to_string(summary)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
            ),
            None => None,
        },
    })
}

fn sort_clause(sort: SortField, dir: SortDir) -> String {
    let column = match sort {
        SortField::Name => "name",
        SortField::NextRun => "next_run",
        SortField::CreatedAt => "created_at",
        SortField::UpdatedAt => "updated_at",
        SortField::Status => "status",
    };
    let direction = match dir {
        SortDir::Asc => "ASC",
        SortDir::Desc => "DESC",
    };
    format!("{column} {direction}")
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn create(&self, task: Task) -> Result<Task, StorageError> {
        let json = json_columns(&task)?;
        let result = sqlx::query(
            "INSERT INTO tasks (id, name, description, kind, schedule, schedule_kind, next_run, \
             period_ms, recurring, max_retries, retry_delay_ms, retry_count, last_retry, status, \
             history, last_execution, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task.id.to_string())
        .bind(&task.name)
        .bind(&task.description)
        .bind(&json.kind)
        .bind(&task.schedule)
        .bind(task.schedule_kind.as_str())
        .bind(task.next_run.timestamp_millis())
        .bind(task.period_ms)
        .bind(task.recurring as i64)
        .bind(i64::from(task.retry.max_retries))
        .bind(task.retry.delay.as_millis() as i64)
        .bind(i64::from(task.retry_count))
        .bind(task.last_retry.map(|t| t.timestamp_millis()))
        .bind(task.status.as_str())
        .bind(&json.history)
        .bind(&json.last_execution)
        .bind(task.created_at.timestamp_millis())
        .bind(task.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(task),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::DuplicateName(task.name))
            }
            Err(e) => Err(StorageError::Other(e.to_string())),
        }
    }

    async fn get(&self, id: &TaskId) -> Result<Task, StorageError> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        row_to_task(&row)
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Task>, StorageError> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE name = ?"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn update(&self, task: Task) -> Result<Task, StorageError> {
        let json = json_columns(&task)?;
        let result = sqlx::query(
            "UPDATE tasks SET name = ?, description = ?, kind = ?, schedule = ?, \
             schedule_kind = ?, next_run = ?, period_ms = ?, recurring = ?, max_retries = ?, \
             retry_delay_ms = ?, retry_count = ?, last_retry = ?, status = ?, history = ?, \
             last_execution = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&task.name)
        .bind(&task.description)
        .bind(&json.kind)
        .bind(&task.schedule)
        .bind(task.schedule_kind.as_str())
        .bind(task.next_run.timestamp_millis())
        .bind(task.period_ms)
        .bind(task.recurring as i64)
        .bind(i64::from(task.retry.max_retries))
        .bind(task.retry.delay.as_millis() as i64)
        .bind(i64::from(task.retry_count))
        .bind(task.last_retry.map(|t| t.timestamp_millis()))
        .bind(task.status.as_str())
        .bind(&json.history)
        .bind(&json.last_execution)
        .bind(task.updated_at.timestamp_millis())
        .bind(task.id.to_string())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                Err(StorageError::NotFound(task.id.to_string()))
            }
            Ok(_) => Ok(task),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::DuplicateName(task.name))
            }
            Err(e) => Err(StorageError::Other(e.to_string())),
        }
    }

    async fn delete(&self, id: &TaskId) -> Result<(), StorageError> {
        let done = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        if done.rows_affected() == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list(&self, query: &ListQuery) -> Result<TaskPage, StorageError> {
        let order = sort_clause(query.sort, query.dir);

        let (rows, total) = if let Some(status) = query.status {
            let rows = sqlx::query(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE status = ? ORDER BY {order} LIMIT ? OFFSET ?"
            ))
            .bind(status.as_str())
            .bind(query.limit as i64)
            .bind(query.skip as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StorageError::Other(e.to_string()))?;
            (rows, total)
        } else {
            let rows = sqlx::query(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks ORDER BY {order} LIMIT ? OFFSET ?"
            ))
            .bind(query.limit as i64)
            .bind(query.skip as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StorageError::Other(e.to_string()))?;
            (rows, total)
        };

        let items = rows
            .iter()
            .map(row_to_task)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TaskPage {
            items,
            total: total as usize,
            skip: query.skip,
            limit: query.limit,
        })
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Task>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE status IN ('active', 'retry-scheduled') AND next_run <= ? \
             ORDER BY next_run ASC LIMIT ?"
        ))
        .bind(now.timestamp_millis())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        rows.iter().map(row_to_task).collect()
    }

    async fn claim(&self, id: &TaskId) -> Result<Option<Task>, StorageError> {
        // Conditional update: the affected-row count decides who wins the
        // lease when pollers overlap.
        let done = sqlx::query(
            "UPDATE tasks SET status = 'running', updated_at = ? \
             WHERE id = ? AND status IN ('active', 'retry-scheduled')",
        )
        .bind(Utc::now().timestamp_millis())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        if done.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await.map(Some)
    }

    async fn running_since_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Task>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE status = 'running' AND updated_at < ? ORDER BY updated_at ASC"
        ))
        .bind(cutoff.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        rows.iter().map(row_to_task).collect()
    }
}
