//! Type-specific task execution strategies.
//!
//! The [`Dispatcher`] routes a task to its execution backend through an
//! exhaustive match over [`TaskKind`], so adding a kind is a compile error
//! until every dispatch site handles it. All strategies share one
//! contract: fail with a categorized [`DispatchError`], or return a
//! JSON-serializable success object the runner treats as opaque.

pub mod email;
pub mod script;
pub mod webhook;

pub use email::{EmailMessage, EmailReceipt, HttpMailer, Mailer};
pub use script::{CommandScript, ScriptHandler, ScriptRegistry};

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::core::task::{Task, TaskKind};

/// Errors produced by task execution.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Script handler threw or could not be resolved.
    #[error("script execution failed: {0}")]
    Script(String),

    /// The webhook request could not be constructed.
    #[error("webhook request invalid: {0}")]
    WebhookRequest(String),

    /// The webhook call failed at the transport level.
    #[error("webhook call failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The webhook target answered with a non-2xx status.
    #[error("webhook returned status {status}")]
    WebhookStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated, for diagnostics.
        body: String,
    },

    /// Email parameters failed validation.
    #[error("email validation failed: {0}")]
    EmailValidation(String),

    /// Email sending is administratively disabled.
    #[error("email sending is disabled")]
    EmailDisabled,

    /// The mail provider rejected the send.
    #[error("email send failed: {0}")]
    Mail(String),
}

/// Routes tasks to their execution backend.
pub struct Dispatcher {
    scripts: Arc<ScriptRegistry>,
    http: reqwest::Client,
    http_no_redirect: reqwest::Client,
    mailer: Option<Arc<dyn Mailer>>,
    email_enabled: bool,
    email_from: Option<String>,
}

impl Dispatcher {
    /// Create a dispatcher with the given script registry. Email is
    /// disabled until a mailer is attached and the gate is opened.
    pub fn new(scripts: Arc<ScriptRegistry>) -> Self {
        Self {
            scripts,
            http: reqwest::Client::new(),
            http_no_redirect: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("http client"),
            mailer: None,
            email_enabled: false,
            email_from: None,
        }
    }

    /// Attach a mail collaborator.
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Open or close the administrative email gate.
    pub fn with_email_enabled(mut self, enabled: bool) -> Self {
        self.email_enabled = enabled;
        self
    }

    /// Set the default From address for outgoing mail.
    pub fn with_email_from(mut self, from: impl Into<String>) -> Self {
        self.email_from = Some(from.into());
        self
    }

    /// Execute a task and return its normalized result.
    pub async fn execute(&self, task: &Task) -> Result<Value, DispatchError> {
        match &task.kind {
            TaskKind::Script { handler, params } => {
                script::run(&self.scripts, handler, params).await
            }
            TaskKind::Webhook { params } => {
                let client = if params.follow_redirects.unwrap_or(true) {
                    &self.http
                } else {
                    &self.http_no_redirect
                };
                webhook::run(client, params).await
            }
            TaskKind::Email { params } => {
                email::run(
                    self.mailer.as_deref(),
                    self.email_enabled,
                    self.email_from.as_deref(),
                    params,
                )
                .await
            }
        }
    }
}
