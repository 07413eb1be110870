//! tempo: a persistent, retrying, multi-type task scheduler.
//!
//! A poll-driven engine that stores tasks durably, dispatches due work to
//! one of several execution backends (script, webhook, email), tracks
//! bounded execution history, retries transient failures with a fixed
//! delay, and keeps its own poll loop alive with a periodic watchdog.

pub mod api;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod history;
pub mod runner;
pub mod service;
pub mod storage;

pub use self::core::retry::RetryPolicy;
pub use self::core::schedule::{
    parse_schedule, ScheduleError, ScheduleKind, ScheduleSpec, SCHEDULE_NOW,
};
pub use self::core::task::{
    EmailParams, Execution, ExecutionStatus, ExecutionSummary, Task, TaskKind, TaskStatus,
    WebhookParams, HISTORY_LIMIT,
};
pub use self::core::types::{ExecutionId, TaskId};
pub use self::dispatch::{DispatchError, Dispatcher, Mailer, ScriptHandler, ScriptRegistry};
pub use self::history::{sanitize_result, ExecutionRecorder};
pub use self::runner::{
    install_runner, install_watchdog, PeriodicSpec, PeriodicTasks, SchedulerContext, TaskRunner,
    TimerRegistry, Watchdog, TASK_RUNNER_JOB, WATCHDOG_JOB,
};
pub use self::service::{
    CreateTaskRequest, ListTasksRequest, ServiceError, TaskService, UpdateTaskRequest,
};
pub use self::storage::{
    ListQuery, MemoryStore, SortDir, SortField, SqliteStore, StorageError, TaskPage, TaskStore,
};
