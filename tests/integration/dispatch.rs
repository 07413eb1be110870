//! Dispatch strategy tests against real HTTP endpoints.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use tempo::dispatch::{webhook, DispatchError, Dispatcher, ScriptRegistry};
use tempo::{parse_schedule, RetryPolicy, Task, TaskKind, WebhookParams};

use crate::common::{spawn_json_server, spawn_status_server, CountingScript};

fn webhook_params(url: &str) -> WebhookParams {
    WebhookParams {
        url: url.to_string(),
        method: None,
        headers: HashMap::new(),
        body: None,
        timeout_ms: Some(5_000),
        follow_redirects: None,
    }
}

#[tokio::test]
async fn test_webhook_success_returns_normalized_result() {
    let url = spawn_json_server().await;
    let client = reqwest::Client::new();

    let result = webhook::run(&client, &webhook_params(&url)).await.unwrap();

    assert_eq!(result["success"], true);
    assert_eq!(result["status"], 200);
    assert_eq!(result["body"]["ok"], true);
    assert_eq!(result["body"]["queue"], "drained");
    assert!(result["duration_ms"].is_number());
    assert!(result["headers"].is_object());
}

#[tokio::test]
async fn test_webhook_post_with_json_body() {
    let url = spawn_json_server().await;
    let client = reqwest::Client::new();

    let mut params = webhook_params(&url);
    params.method = Some("post".to_string());
    params.body = Some(json!({ "batch": 42 }));

    let result = webhook::run(&client, &params).await.unwrap();
    assert_eq!(result["status"], 200);
}

#[tokio::test]
async fn test_webhook_non_2xx_fails_with_status_and_body() {
    let url = spawn_status_server(503).await;
    let client = reqwest::Client::new();

    let err = webhook::run(&client, &webhook_params(&url)).await.unwrap_err();

    match err {
        DispatchError::WebhookStatus { status, body } => {
            assert_eq!(status, 503);
            assert!(body.contains("server says hi"));
        }
        other => panic!("expected WebhookStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn test_dispatcher_routes_each_kind() {
    let scripts = Arc::new(ScriptRegistry::new());
    scripts.register("job", Arc::new(CountingScript::succeeding()));
    let dispatcher = Dispatcher::new(Arc::clone(&scripts));

    let now = chrono::Utc::now();
    let spec = parse_schedule("now", now).unwrap();

    let script_task = Task::new(
        "script-task",
        None,
        TaskKind::Script {
            handler: "job".to_string(),
            params: json!({ "depth": 1 }),
        },
        "now",
        spec,
        RetryPolicy::none(),
    );
    let result = dispatcher.execute(&script_task).await.unwrap();
    assert_eq!(result["success"], true);

    let url = spawn_json_server().await;
    let webhook_task = Task::new(
        "webhook-task",
        None,
        TaskKind::Webhook {
            params: webhook_params(&url),
        },
        "now",
        spec,
        RetryPolicy::none(),
    );
    let result = dispatcher.execute(&webhook_task).await.unwrap();
    assert_eq!(result["status"], 200);
}

#[tokio::test]
async fn test_dispatcher_unknown_script_handler_fails() {
    let dispatcher = Dispatcher::new(Arc::new(ScriptRegistry::new()));
    let spec = parse_schedule("now", chrono::Utc::now()).unwrap();

    let task = Task::new(
        "mystery",
        None,
        TaskKind::Script {
            handler: "missing".to_string(),
            params: json!({}),
        },
        "now",
        spec,
        RetryPolicy::none(),
    );

    let err = dispatcher.execute(&task).await.unwrap_err();
    assert!(matches!(err, DispatchError::Script(_)));
}
