//! Email execution strategy.
//!
//! Validates message parameters, honors the administrative email gate, and
//! delegates the actual send to a [`Mailer`] collaborator. The bundled
//! [`HttpMailer`] posts messages to an HTTP mail-provider endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::DispatchError;
use crate::core::task::EmailParams;

/// An outgoing email message handed to the mail collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    pub subject: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
}

/// Receipt returned by a successful send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailReceipt {
    /// Provider-assigned (or generated) message id.
    pub message_id: String,
    /// Name of the provider that accepted the message.
    pub provider: String,
}

/// Mail-sending collaborator.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send a message, returning a receipt. Any error fails the dispatch.
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<EmailReceipt>;
}

/// Validate email params before any send is attempted.
pub fn validate(params: &EmailParams) -> Result<(), DispatchError> {
    if params.to.is_empty() || params.to.iter().all(|r| r.trim().is_empty()) {
        return Err(DispatchError::EmailValidation(
            "at least one recipient is required".to_string(),
        ));
    }
    if params.subject.trim().is_empty() {
        return Err(DispatchError::EmailValidation(
            "subject is required".to_string(),
        ));
    }
    let has_text = params.text.as_deref().is_some_and(|t| !t.trim().is_empty());
    let has_html = params.html.as_deref().is_some_and(|h| !h.trim().is_empty());
    if !has_text && !has_html {
        return Err(DispatchError::EmailValidation(
            "a text or html body is required".to_string(),
        ));
    }
    Ok(())
}

/// Execute an email task.
pub async fn run(
    mailer: Option<&dyn Mailer>,
    enabled: bool,
    default_from: Option<&str>,
    params: &EmailParams,
) -> Result<Value, DispatchError> {
    validate(params)?;

    if !enabled {
        return Err(DispatchError::EmailDisabled);
    }
    let mailer = mailer.ok_or(DispatchError::EmailDisabled)?;

    let message = EmailMessage {
        to: params.to.clone(),
        cc: params.cc.clone(),
        bcc: params.bcc.clone(),
        from: default_from.map(str::to_string),
        reply_to: params.reply_to.clone(),
        subject: params.subject.clone(),
        text: params.text.clone(),
        html: params.html.clone(),
    };

    let receipt = mailer
        .send(&message)
        .await
        .map_err(|e| DispatchError::Mail(e.to_string()))?;

    Ok(json!({
        "success": true,
        "message_id": receipt.message_id,
        "provider": receipt.provider,
        "recipients": params.to,
    }))
}

/// Mailer that posts messages to an HTTP mail-provider endpoint.
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    provider: String,
}

impl HttpMailer {
    /// Create a mailer for the given provider endpoint.
    pub fn new(endpoint: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            provider: provider.into(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<EmailReceipt> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(message)
            .send()
            .await?;

        let status = response.status();
        anyhow::ensure!(
            status.is_success(),
            "mail provider returned status {status}"
        );

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message_id = body
            .get("message_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(EmailReceipt {
            message_id,
            provider: self.provider.clone(),
        })
    }
}
