//! HTTP management API tests.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use tempo::api::{build_router, create_api_state};

use crate::common::{self, CountingScript, Harness};

fn router_for(h: &Harness) -> Router {
    build_router(create_api_state(Arc::clone(&h.service)))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn script_task_body(name: &str) -> Value {
    json!({
        "name": name,
        "kind": { "type": "script", "handler": "noop", "params": {} },
        "schedule": "now",
        "max_retries": 0,
        "retry_delay_ms": 0,
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let h = common::harness();
    let router = router_for(&h);

    let response = router.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_create_task_returns_created() {
    let h = common::harness();
    let router = router_for(&h);

    let response = router
        .oneshot(post_json("/api/tasks", script_task_body("api-made")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["name"], "api-made");
    assert_eq!(body["type"], "script");
    assert_eq!(body["status"], "active");
    assert!(body["id"].is_string());
}

#[tokio::test]
async fn test_duplicate_name_is_conflict() {
    let h = common::harness();
    let router = router_for(&h);

    let first = router
        .clone()
        .oneshot(post_json("/api/tasks", script_task_body("twice")))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = router
        .oneshot(post_json("/api/tasks", script_task_body("twice")))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let body = body_json(second).await;
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_invalid_schedule_is_bad_request() {
    let h = common::harness();
    let router = router_for(&h);

    let mut task = script_task_body("bad-schedule");
    task["schedule"] = json!("* * * * *");

    let response = router.oneshot(post_json("/api/tasks", task)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert!(body["error"].as_str().unwrap().contains("schedule"));
}

#[tokio::test]
async fn test_missing_webhook_url_is_bad_request() {
    let h = common::harness();
    let router = router_for(&h);

    let task = json!({
        "name": "hookless",
        "kind": { "type": "webhook", "params": { "url": "not a url" } },
        "schedule": "now",
    });

    let response = router.oneshot(post_json("/api/tasks", task)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_unknown_task_is_not_found() {
    let h = common::harness();
    let router = router_for(&h);

    let response = router
        .clone()
        .oneshot(get(&format!(
            "/api/tasks/{}",
            uuid::Uuid::new_v4()
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // A malformed id is also a 404, not a 500.
    let response = router
        .oneshot(get("/api/tasks/not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_task_by_name() {
    let h = common::harness();
    let router = router_for(&h);

    let created = router
        .clone()
        .oneshot(post_json("/api/tasks", script_task_body("findable")))
        .await
        .unwrap();
    let id = body_json(created).await["id"].as_str().unwrap().to_string();

    let response = router
        .clone()
        .oneshot(get("/api/tasks/by-name/findable"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], id.as_str());

    let response = router
        .oneshot(get("/api/tasks/by-name/unknown"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_tasks_pages_and_filters() {
    let h = common::harness();
    let router = router_for(&h);

    for name in ["a-task", "b-task", "c-task"] {
        let response = router
            .clone()
            .oneshot(post_json("/api/tasks", script_task_body(name)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = router
        .clone()
        .oneshot(get("/api/tasks?skip=1&limit=1&sort=name&dir=asc"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["name"], "b-task");

    // Status filter matches nothing yet.
    let response = router
        .oneshot(get("/api/tasks?status=failed"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_pause_resume_endpoints() {
    let h = common::harness();
    let router = router_for(&h);

    let created = router
        .clone()
        .oneshot(post_json("/api/tasks", script_task_body("pausable")))
        .await
        .unwrap();
    let task = body_json(created).await;
    let id = task["id"].as_str().unwrap().to_string();

    let response = router
        .clone()
        .oneshot(post_json(&format!("/api/tasks/{id}/pause"), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "paused");

    // Pausing again conflicts.
    let response = router
        .clone()
        .oneshot(post_json(&format!("/api/tasks/{id}/pause"), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = router
        .oneshot(post_json(&format!("/api/tasks/{id}/resume"), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "active");
}

#[tokio::test]
async fn test_run_endpoint_executes_and_records() {
    let h = common::harness();
    h.scripts
        .register("noop", Arc::new(CountingScript::succeeding()));
    let router = router_for(&h);

    let created = router
        .clone()
        .oneshot(post_json("/api/tasks", script_task_body("runnable")))
        .await
        .unwrap();
    let task = body_json(created).await;
    let id = task["id"].as_str().unwrap().to_string();

    let response = router
        .clone()
        .oneshot(post_json(&format!("/api/tasks/{id}/run"), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["executed"], true);

    let response = router
        .clone()
        .oneshot(get(&format!("/api/tasks/{id}/executions")))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["executions"][0]["status"], "completed");

    // One-shot task is now terminal: running again reports false.
    let response = router
        .oneshot(post_json(&format!("/api/tasks/{id}/run"), json!({})))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["executed"], false);
}

#[tokio::test]
async fn test_update_and_delete_endpoints() {
    let h = common::harness();
    let router = router_for(&h);

    let created = router
        .clone()
        .oneshot(post_json("/api/tasks", script_task_body("mutable")))
        .await
        .unwrap();
    let task = body_json(created).await;
    let id = task["id"].as_str().unwrap().to_string();

    let patch = Request::builder()
        .method("PATCH")
        .uri(format!("/api/tasks/{id}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "description": "patched", "schedule": "0 * * * *" }).to_string(),
        ))
        .unwrap();
    let response = router.clone().oneshot(patch).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["description"], "patched");
    assert_eq!(body["schedule_kind"], "hourly");
    assert_eq!(body["recurring"], true);

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/tasks/{id}"))
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(get(&format!("/api/tasks/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stuck_diagnostics_endpoint() {
    let h = common::harness();
    let router = router_for(&h);

    let response = router.oneshot(get("/api/diagnostics/stuck")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["count"], 0);
    assert!(body["tasks"].as_array().unwrap().is_empty());
}
