//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::routing::any;
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tempo::config::SchedulerConfig;
use tempo::dispatch::{Dispatcher, EmailMessage, EmailReceipt, Mailer, ScriptRegistry};
use tempo::runner::{SchedulerContext, TaskRunner};
use tempo::service::{CreateTaskRequest, TaskService};
use tempo::storage::{MemoryStore, TaskStore};
use tempo::{EmailParams, ScriptHandler, TaskId, TaskKind, WebhookParams};

/// Fully wired scheduler over an in-memory store.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub scripts: Arc<ScriptRegistry>,
    pub runner: Arc<TaskRunner>,
    pub service: Arc<TaskService>,
}

/// Build a harness, customizing the dispatcher (mailer, email gate).
pub fn build_harness(customize: impl FnOnce(Dispatcher) -> Dispatcher) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let store_dyn: Arc<dyn TaskStore> = store.clone();
    let scripts = Arc::new(ScriptRegistry::new());
    let dispatcher = customize(Dispatcher::new(Arc::clone(&scripts)));

    let ctx = SchedulerContext::new(
        Arc::clone(&store_dyn),
        Arc::new(dispatcher),
        SchedulerConfig::default(),
    );
    let runner = Arc::new(TaskRunner::new(ctx));
    let service = Arc::new(TaskService::new(store_dyn, Arc::clone(&runner)));

    Harness {
        store,
        scripts,
        runner,
        service,
    }
}

/// Build a harness with a default dispatcher.
pub fn harness() -> Harness {
    build_harness(|dispatcher| dispatcher)
}

/// Script handler that fails its first `fail_times` calls, then succeeds.
pub struct CountingScript {
    calls: AtomicU32,
    fail_times: u32,
}

impl CountingScript {
    pub fn new(fail_times: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail_times,
        }
    }

    /// Handler that always succeeds.
    pub fn succeeding() -> Self {
        Self::new(0)
    }

    /// Handler that never succeeds.
    pub fn always_failing() -> Self {
        Self::new(u32::MAX)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScriptHandler for CountingScript {
    async fn run(&self, _params: &Value) -> anyhow::Result<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_times {
            anyhow::bail!("simulated failure on call {call}")
        }
        Ok(json!({ "success": true, "call": call }))
    }
}

/// Mailer that records every message it is asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<EmailReceipt> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(EmailReceipt {
            message_id: format!("msg-{}", self.sent.lock().unwrap().len()),
            provider: "recording".to_string(),
        })
    }
}

/// Request for a script task.
pub fn script_request(
    name: &str,
    handler: &str,
    schedule: &str,
    max_retries: u32,
    retry_delay_ms: u64,
) -> CreateTaskRequest {
    CreateTaskRequest {
        name: name.to_string(),
        description: None,
        kind: TaskKind::Script {
            handler: handler.to_string(),
            params: json!({}),
        },
        schedule: schedule.to_string(),
        max_retries,
        retry_delay_ms,
    }
}

/// Request for a webhook task.
pub fn webhook_request(name: &str, url: &str, schedule: &str) -> CreateTaskRequest {
    CreateTaskRequest {
        name: name.to_string(),
        description: None,
        kind: TaskKind::Webhook {
            params: WebhookParams {
                url: url.to_string(),
                method: None,
                headers: Default::default(),
                body: None,
                timeout_ms: Some(5_000),
                follow_redirects: None,
            },
        },
        schedule: schedule.to_string(),
        max_retries: 0,
        retry_delay_ms: 0,
    }
}

/// Request for an email task.
pub fn email_request(name: &str, to: &str, schedule: &str) -> CreateTaskRequest {
    CreateTaskRequest {
        name: name.to_string(),
        description: None,
        kind: TaskKind::Email {
            params: EmailParams {
                to: vec![to.to_string()],
                cc: Vec::new(),
                bcc: Vec::new(),
                reply_to: None,
                subject: "Scheduled report".to_string(),
                text: Some("All systems nominal.".to_string()),
                html: None,
                provider: None,
            },
        },
        schedule: schedule.to_string(),
        max_retries: 0,
        retry_delay_ms: 0,
    }
}

/// Backdate a task's `next_run` so the next poll picks it up.
pub async fn make_due(store: &MemoryStore, id: &TaskId) {
    let mut task = store.get(id).await.expect("task exists");
    task.next_run = Utc::now() - Duration::seconds(1);
    store.update(task).await.expect("update task");
}

/// Spawn a throwaway HTTP server answering every request with `status`.
/// Returns the URL of its `/hook` endpoint.
pub async fn spawn_status_server(status: u16) -> String {
    let app = Router::new().route(
        "/hook",
        any(move || async move {
            (
                StatusCode::from_u16(status).expect("valid status"),
                "server says hi",
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}/hook")
}

/// Spawn a throwaway HTTP server answering with a JSON document.
pub async fn spawn_json_server() -> String {
    let app = Router::new().route(
        "/hook",
        any(|| async { axum::Json(json!({ "ok": true, "queue": "drained" })) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}/hook")
}
