//! Webhook execution strategy.
//!
//! Builds an outbound HTTP request from the task's webhook params and
//! treats any non-2xx response as a failure carrying the status and body
//! for diagnostics.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};

use super::DispatchError;
use crate::core::task::WebhookParams;

/// Default request timeout when the task specifies none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Response-body bytes retained on a failed call.
const ERROR_BODY_LIMIT: usize = 2_000;

fn truncate_body(body: &str) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        return body.to_string();
    }
    let mut end = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

fn build_headers(params: &WebhookParams) -> Result<HeaderMap, DispatchError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &params.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| DispatchError::WebhookRequest(format!("invalid header name: {name}")))?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            DispatchError::WebhookRequest(format!("invalid header value for {name:?}"))
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Execute a webhook call.
pub async fn run(client: &reqwest::Client, params: &WebhookParams) -> Result<Value, DispatchError> {
    let method_str = params.method.as_deref().unwrap_or("GET").to_uppercase();
    let method = Method::from_bytes(method_str.as_bytes())
        .map_err(|_| DispatchError::WebhookRequest(format!("invalid method: {method_str}")))?;

    let headers = build_headers(params)?;
    let has_content_type = headers.contains_key(CONTENT_TYPE);
    let timeout = params
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_TIMEOUT);

    let mut request = client
        .request(method, params.url.as_str())
        .headers(headers)
        .timeout(timeout);

    match &params.body {
        None => {}
        Some(Value::String(text)) => {
            request = request.body(text.clone());
        }
        Some(value) => {
            // Object/array bodies are JSON-encoded; Content-Type defaults
            // to application/json unless the task set one explicitly.
            let encoded = serde_json::to_vec(value)
                .map_err(|e| DispatchError::WebhookRequest(e.to_string()))?;
            request = request.body(encoded);
            if !has_content_type {
                request = request.header(CONTENT_TYPE, "application/json");
            }
        }
    }

    let started = Instant::now();
    let response = request.send().await?;
    let status = response.status();

    let mut response_headers = Map::new();
    for (name, value) in response.headers() {
        response_headers.insert(
            name.to_string(),
            Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
        );
    }

    let text = response.text().await?;
    let duration_ms = started.elapsed().as_millis() as u64;

    if !status.is_success() {
        return Err(DispatchError::WebhookStatus {
            status: status.as_u16(),
            body: truncate_body(&text),
        });
    }

    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

    Ok(json!({
        "success": true,
        "status": status.as_u16(),
        "headers": Value::Object(response_headers),
        "body": body,
        "duration_ms": duration_ms,
    }))
}
