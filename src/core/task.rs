//! Task and execution data model.
//!
//! [`Task`] is the central persisted entity: what to run (a closed set of
//! execution kinds), when to run it (schedule-derived fields), how to retry
//! it, and a bounded history of recent executions with a denormalized
//! last-execution summary.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::core::retry::RetryPolicy;
use crate::core::schedule::{ScheduleKind, ScheduleSpec};
use crate::core::types::{ExecutionId, TaskId};

/// Number of execution records retained per task (oldest evicted first).
pub const HISTORY_LIMIT: usize = 10;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Eligible for the due-task poll.
    Active,
    /// Claimed by a dispatcher; excluded from polling.
    Running,
    /// Excluded from polling until resumed.
    Paused,
    /// Failed, waiting for its scheduled retry.
    RetryScheduled,
    /// One-shot task finished successfully (terminal).
    Completed,
    /// Retries exhausted (terminal).
    Failed,
}

impl TaskStatus {
    /// Stable string form (used by storage backends and filters).
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::RetryScheduled => "retry-scheduled",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(TaskStatus::Active),
            "running" => Some(TaskStatus::Running),
            "paused" => Some(TaskStatus::Paused),
            "retry-scheduled" => Some(TaskStatus::RetryScheduled),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    /// Terminal states receive no further scheduling.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for a webhook task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookParams {
    /// Target URL.
    pub url: String,
    /// HTTP method; defaults to GET.
    #[serde(default)]
    pub method: Option<String>,
    /// Extra request headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request body. Objects and arrays are JSON-encoded.
    #[serde(default)]
    pub body: Option<Value>,
    /// Request timeout in milliseconds; defaults to 30s.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Whether to follow redirects; defaults to true.
    #[serde(default)]
    pub follow_redirects: Option<bool>,
}

/// Parameters for an email task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailParams {
    /// Primary recipients.
    #[serde(default)]
    pub to: Vec<String>,
    /// Carbon-copy recipients.
    #[serde(default)]
    pub cc: Vec<String>,
    /// Blind-carbon-copy recipients.
    #[serde(default)]
    pub bcc: Vec<String>,
    /// Reply-To address.
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Message subject.
    #[serde(default)]
    pub subject: String,
    /// Plain-text body.
    #[serde(default)]
    pub text: Option<String>,
    /// HTML body.
    #[serde(default)]
    pub html: Option<String>,
    /// Optional provider override.
    #[serde(default)]
    pub provider: Option<String>,
}

/// What a task executes. A closed union: adding a kind forces every
/// dispatch site to handle it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskKind {
    /// Invoke a named, pre-registered script handler.
    Script {
        /// Registered handler name (or path under the command root).
        handler: String,
        /// Handler parameters, passed through verbatim.
        #[serde(default)]
        params: Value,
    },
    /// Make an outbound HTTP call.
    Webhook {
        /// Request parameters.
        params: WebhookParams,
    },
    /// Send an email through the configured mailer.
    Email {
        /// Message parameters.
        params: EmailParams,
    },
}

impl TaskKind {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::Script { .. } => "script",
            TaskKind::Webhook { .. } => "webhook",
            TaskKind::Email { .. } => "email",
        }
    }
}

/// Status of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Dispatch has begun.
    Started,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

/// One attempt at executing a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Unique execution identifier.
    pub id: ExecutionId,
    /// Owning task.
    pub task_id: TaskId,
    /// Attempt status.
    pub status: ExecutionStatus,
    /// When dispatch began.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds; None until finished.
    pub duration_ms: Option<i64>,
    /// Error message, if the attempt failed.
    pub error: Option<String>,
    /// Sanitized, size-capped result, if the attempt produced one.
    pub result: Option<Value>,
}

impl Execution {
    /// Create a freshly-started execution record.
    pub fn started(task_id: TaskId) -> Self {
        Self {
            id: ExecutionId::new(),
            task_id,
            status: ExecutionStatus::Started,
            started_at: Utc::now(),
            duration_ms: None,
            error: None,
            result: None,
        }
    }

    /// Finalize as completed.
    pub fn finish_completed(&mut self, duration_ms: i64, result: Value) {
        self.status = ExecutionStatus::Completed;
        self.duration_ms = Some(duration_ms);
        self.error = None;
        self.result = Some(result);
    }

    /// Finalize as failed.
    pub fn finish_failed(&mut self, duration_ms: i64, error: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.duration_ms = Some(duration_ms);
        self.error = Some(error.into());
    }
}

/// Denormalized summary of the most recent execution, surfaced by read
/// endpoints without replaying the full history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Status of the latest attempt.
    pub status: ExecutionStatus,
    /// When the latest attempt started.
    pub time: DateTime<Utc>,
    /// Duration of the latest attempt, if finished.
    pub duration_ms: Option<i64>,
    /// Error of the latest attempt, if any.
    pub error: Option<String>,
    /// Sanitized result of the latest attempt, if any.
    pub result: Option<Value>,
}

impl From<&Execution> for ExecutionSummary {
    fn from(exec: &Execution) -> Self {
        Self {
            status: exec.status,
            time: exec.started_at,
            duration_ms: exec.duration_ms,
            error: exec.error.clone(),
            result: exec.result.clone(),
        }
    }
}

/// A scheduled task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned identifier.
    pub id: TaskId,
    /// Unique human-readable name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// What to execute.
    #[serde(flatten)]
    pub kind: TaskKind,
    /// Original schedule expression (cron shape or `"now"`).
    pub schedule: String,
    /// Derived schedule kind.
    pub schedule_kind: ScheduleKind,
    /// Next eligible run time.
    pub next_run: DateTime<Utc>,
    /// Repeat period in milliseconds; 0 for one-shots.
    pub period_ms: i64,
    /// Whether the task re-schedules itself after success.
    pub recurring: bool,
    /// Retry policy.
    pub retry: RetryPolicy,
    /// Retries consumed since the last success.
    pub retry_count: u32,
    /// When the last retry was scheduled.
    pub last_retry: Option<DateTime<Utc>>,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Bounded list of recent executions, oldest first.
    #[serde(default)]
    pub history: Vec<Execution>,
    /// Summary of the most recent execution.
    #[serde(default)]
    pub last_execution: Option<ExecutionSummary>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task from validated inputs.
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        kind: TaskKind,
        schedule: impl Into<String>,
        spec: ScheduleSpec,
        retry: RetryPolicy,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            name: name.into(),
            description,
            kind,
            schedule: schedule.into(),
            schedule_kind: spec.kind,
            next_run: spec.next_run,
            period_ms: spec.period_ms,
            recurring: spec.kind != ScheduleKind::Once,
            retry,
            retry_count: 0,
            last_retry: None,
            status: TaskStatus::Active,
            history: Vec::new(),
            last_execution: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the schedule and re-derive the scheduling fields.
    ///
    /// Re-scheduling a terminal task reactivates it; retry bookkeeping is
    /// reset since the task is effectively starting a new cycle.
    pub fn apply_schedule(&mut self, expression: impl Into<String>, spec: ScheduleSpec) {
        self.schedule = expression.into();
        self.schedule_kind = spec.kind;
        self.next_run = spec.next_run;
        self.period_ms = spec.period_ms;
        self.recurring = spec.kind != ScheduleKind::Once;
        self.retry_count = 0;
        self.last_retry = None;
        if self.status.is_terminal() {
            self.status = TaskStatus::Active;
        }
    }

    /// Append an execution record, evicting the oldest past [`HISTORY_LIMIT`].
    pub fn push_execution(&mut self, execution: Execution) {
        self.history.push(execution);
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }

    /// Look up a history entry by execution id.
    pub fn execution_mut(&mut self, id: &ExecutionId) -> Option<&mut Execution> {
        self.history.iter_mut().find(|e| &e.id == id)
    }

    /// Refresh the denormalized last-execution summary from history.
    pub fn refresh_last_execution(&mut self) {
        self.last_execution = self.history.last().map(ExecutionSummary::from);
    }

    /// Apply the post-success transition.
    ///
    /// Resets retry bookkeeping. Recurring tasks advance `next_run` by whole
    /// periods until it is strictly in the future, so occurrences missed
    /// while the task was overdue are skipped rather than replayed. One-shot
    /// tasks become `completed`.
    pub fn advance_after_success(&mut self, now: DateTime<Utc>) {
        self.retry_count = 0;
        self.last_retry = None;
        if self.recurring && self.period_ms > 0 {
            let period = ChronoDuration::milliseconds(self.period_ms);
            while self.next_run <= now {
                self.next_run = self.next_run + period;
            }
            self.status = TaskStatus::Active;
        } else {
            self.status = TaskStatus::Completed;
        }
    }

    /// Apply the post-failure transition when a retry remains.
    pub fn schedule_retry(&mut self, now: DateTime<Utc>) {
        self.retry_count += 1;
        self.last_retry = Some(now);
        self.next_run = now
            + ChronoDuration::milliseconds(self.retry.delay.as_millis() as i64);
        self.status = TaskStatus::RetryScheduled;
    }

    /// Apply the terminal-failure transition.
    pub fn mark_failed(&mut self) {
        self.status = TaskStatus::Failed;
    }

    /// Bump the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
