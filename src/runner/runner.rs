//! The due-task poll loop and task state machine.
//!
//! Each poll cycle queries the store for due tasks, claims them one at a
//! time through the store's atomic lease, dispatches, and applies the
//! success/retry/fail transition. A failure in one task never aborts the
//! cycle for the rest.

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::core::task::Task;
use crate::core::types::TaskId;
use crate::runner::context::SchedulerContext;
use crate::storage::StorageError;

/// Executes due tasks against the scheduler context.
pub struct TaskRunner {
    ctx: SchedulerContext,
}

impl TaskRunner {
    /// Create a runner over the given context.
    pub fn new(ctx: SchedulerContext) -> Self {
        Self { ctx }
    }

    /// Access the runner's context.
    pub fn context(&self) -> &SchedulerContext {
        &self.ctx
    }

    /// Run one poll cycle. Returns the number of tasks dispatched.
    pub async fn poll_once(&self) -> usize {
        let now = Utc::now();
        let due = match self
            .ctx
            .store
            .due(now, self.ctx.config.max_tasks_per_poll)
            .await
        {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "due-task query failed, skipping poll cycle");
                return 0;
            }
        };

        if due.is_empty() {
            return 0;
        }
        debug!(count = due.len(), "found due tasks");

        let mut dispatched = 0;
        for task in due {
            match self.ctx.store.claim(&task.id).await {
                Ok(Some(claimed)) => {
                    dispatched += 1;
                    self.run_claimed(claimed).await;
                }
                Ok(None) => {
                    // Another poller won the lease, or the task was
                    // mutated since the due query.
                    debug!(task = %task.name, "task no longer claimable, skipping");
                }
                Err(e) => {
                    warn!(task = %task.name, error = %e, "failed to claim task");
                }
            }
        }
        dispatched
    }

    /// Execute a task that has already been claimed (status `running`).
    async fn run_claimed(&self, mut task: Task) {
        let execution_id = self.ctx.recorder.record_started(&mut task).await;
        info!(task = %task.name, kind = task.kind.label(), execution = %execution_id,
            "dispatching task");

        let started = Instant::now();
        let outcome = self.ctx.dispatcher.execute(&task).await;
        let duration_ms = started.elapsed().as_millis() as i64;
        let now = Utc::now();

        match outcome {
            Ok(result) => {
                self.ctx
                    .recorder
                    .record_completed(&mut task, &execution_id, duration_ms, &result);
                task.advance_after_success(now);
                info!(task = %task.name, duration_ms, status = %task.status,
                    "task completed");
            }
            Err(error) => {
                if task.retry.should_retry(task.retry_count) {
                    let attempt = task.retry_count + 1;
                    let max = task.retry.max_retries;
                    self.ctx.recorder.record_failed(
                        &mut task,
                        &execution_id,
                        duration_ms,
                        format!("{error} (retry {attempt}/{max} scheduled)"),
                    );
                    task.schedule_retry(now);
                    warn!(task = %task.name, error = %error, attempt,
                        next_run = %task.next_run, "task failed, retry scheduled");
                } else {
                    self.ctx.recorder.record_failed(
                        &mut task,
                        &execution_id,
                        duration_ms,
                        error.to_string(),
                    );
                    task.mark_failed();
                    warn!(task = %task.name, error = %error,
                        retries = task.retry_count, "task failed permanently");
                }
            }
        }

        task.touch();
        if let Err(e) = self.ctx.store.update(task.clone()).await {
            warn!(task = %task.name, error = %e,
                "failed to persist task after execution");
        }
    }

    /// Execute a task immediately, regardless of `next_run`.
    ///
    /// Goes through the same claim lease as the poller, so a task already
    /// running (or paused, or terminal) is not dispatched; returns whether
    /// the task actually ran.
    pub async fn run_now(&self, id: &TaskId) -> Result<bool, StorageError> {
        match self.ctx.store.claim(id).await? {
            Some(task) => {
                info!(task = %task.name, "manual execution requested");
                self.run_claimed(task).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Tasks stuck in `running` past the configured threshold.
    ///
    /// A crashed dispatch leaves its task `running` forever; this is the
    /// diagnostic hook operators watch to find and reset them.
    pub async fn stuck_tasks(&self) -> Result<Vec<Task>, StorageError> {
        let threshold =
            ChronoDuration::seconds(self.ctx.config.stuck_threshold_secs as i64);
        self.ctx
            .store
            .running_since_before(Utc::now() - threshold)
            .await
    }
}
