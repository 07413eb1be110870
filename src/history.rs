//! Execution history recording and result sanitization.
//!
//! The recorder appends bounded execution records to a task and keeps the
//! denormalized last-execution summary fresh. Executor results are
//! untrusted, arbitrarily-shaped payloads: they are round-tripped through
//! serialization and size-capped before they ever reach the store, so a
//! misbehaving handler cannot corrupt the task document.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use crate::core::task::{Execution, Task};
use crate::core::types::ExecutionId;
use crate::storage::TaskStore;

/// Maximum serialized result size persisted verbatim.
pub const MAX_RESULT_BYTES: usize = 10_000;

/// Bytes of the raw serialized result kept in a truncation envelope.
pub const RESULT_PREVIEW_BYTES: usize = 500;

/// JSON type name for diagnostics.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Sanitize an executor result before persistence.
///
/// Small results are deep-cloned via a serialization round trip. Oversized
/// results are replaced with a bounded truncation envelope carrying a
/// preview of the raw serialized form. Results that cannot be serialized
/// degrade to a minimal descriptor that preserves the success flag.
pub fn sanitize_result(value: &Value) -> Value {
    match serde_json::to_string(value) {
        Ok(raw) if raw.len() <= MAX_RESULT_BYTES => {
            serde_json::from_str(&raw).unwrap_or(Value::Null)
        }
        Ok(raw) => {
            let mut end = RESULT_PREVIEW_BYTES.min(raw.len());
            while !raw.is_char_boundary(end) {
                end -= 1;
            }
            json!({
                "truncated": true,
                "type": json_type_name(value),
                "summary": format!("{} byte result truncated", raw.len()),
                "preview": &raw[..end],
            })
        }
        Err(_) => json!({
            "type": json_type_name(value),
            "error": "could not serialize",
            "success": !matches!(value.get("success"), Some(Value::Bool(false))),
        }),
    }
}

/// Records execution attempts against task documents.
#[derive(Clone)]
pub struct ExecutionRecorder {
    store: Arc<dyn TaskStore>,
}

impl ExecutionRecorder {
    /// Create a recorder over the given store.
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Append a `started` execution record and persist it best-effort.
    ///
    /// A store failure here is logged and swallowed: losing a history entry
    /// is less harmful than blocking the dispatch that is about to happen.
    pub async fn record_started(&self, task: &mut Task) -> ExecutionId {
        let execution = Execution::started(task.id.clone());
        let id = execution.id.clone();
        task.push_execution(execution);
        task.refresh_last_execution();
        task.touch();
        if let Err(e) = self.store.update(task.clone()).await {
            warn!(task = %task.name, execution = %id, error = %e,
                "failed to persist started execution record");
        }
        id
    }

    /// Finalize an execution as completed, with its sanitized result.
    ///
    /// Mutates the task in place; persistence rides on the caller's
    /// status-transition update. Returns false if the record was already
    /// evicted from the bounded history.
    pub fn record_completed(
        &self,
        task: &mut Task,
        id: &ExecutionId,
        duration_ms: i64,
        result: &Value,
    ) -> bool {
        let sanitized = sanitize_result(result);
        let found = match task.execution_mut(id) {
            Some(execution) => {
                execution.finish_completed(duration_ms, sanitized);
                true
            }
            None => {
                warn!(task = %task.name, execution = %id,
                    "execution record missing from history, cannot finalize");
                false
            }
        };
        task.refresh_last_execution();
        found
    }

    /// Finalize an execution as failed.
    ///
    /// Mutates the task in place; persistence rides on the caller's
    /// status-transition update.
    pub fn record_failed(
        &self,
        task: &mut Task,
        id: &ExecutionId,
        duration_ms: i64,
        error: impl Into<String>,
    ) -> bool {
        let found = match task.execution_mut(id) {
            Some(execution) => {
                execution.finish_failed(duration_ms, error);
                true
            }
            None => {
                warn!(task = %task.name, execution = %id,
                    "execution record missing from history, cannot finalize");
                false
            }
        };
        task.refresh_last_execution();
        found
    }
}
