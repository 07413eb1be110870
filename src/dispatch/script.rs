//! Script execution strategy.
//!
//! Script tasks name a handler from a registry of pre-registered
//! [`ScriptHandler`] implementations. A configured command root lets
//! handler names resolve to executables on disk, run as subprocesses with
//! captured output in the manner of an external command task.

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::process::Command;

use super::DispatchError;

/// Default timeout for command scripts.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// A named script executed with the task's params.
#[async_trait]
pub trait ScriptHandler: Send + Sync {
    /// Run the handler. Any error propagates as a dispatch failure.
    async fn run(&self, params: &Value) -> anyhow::Result<Value>;
}

/// Registry of pre-registered script handlers.
pub struct ScriptRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ScriptHandler>>>,
    command_root: Option<PathBuf>,
}

impl ScriptRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            command_root: None,
        }
    }

    /// Create a registry that also resolves handler names to executables
    /// under `root`.
    pub fn with_command_root(root: impl Into<PathBuf>) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            command_root: Some(root.into()),
        }
    }

    /// Register (or replace) a handler under a name.
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn ScriptHandler>) {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.insert(name.into(), handler);
        }
    }

    /// Resolve a handler by name: registered handlers first, then the
    /// command root. Names with path separators never touch the
    /// filesystem.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn ScriptHandler>> {
        if let Ok(handlers) = self.handlers.read() {
            if let Some(handler) = handlers.get(name) {
                return Some(Arc::clone(handler));
            }
        }

        let root = self.command_root.as_ref()?;
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return None;
        }
        let path = root.join(name);
        if path.is_file() {
            Some(Arc::new(CommandScript::new(path)))
        } else {
            None
        }
    }
}

impl Default for ScriptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute a named script handler.
pub async fn run(
    registry: &ScriptRegistry,
    handler: &str,
    params: &Value,
) -> Result<Value, DispatchError> {
    let resolved = registry
        .resolve(handler)
        .ok_or_else(|| DispatchError::Script(format!("unknown script handler: {handler}")))?;
    resolved
        .run(params)
        .await
        .map_err(|e| DispatchError::Script(e.to_string()))
}

/// Script handler backed by an external executable.
///
/// The task params are passed as a single JSON argument; stdout is parsed
/// as JSON when possible, otherwise wrapped verbatim. A non-zero exit code
/// fails the execution with the captured stderr.
pub struct CommandScript {
    program: PathBuf,
    timeout: Duration,
}

impl CommandScript {
    /// Create a command script for the given executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Override the execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ScriptHandler for CommandScript {
    async fn run(&self, params: &Value) -> anyhow::Result<Value> {
        let payload = serde_json::to_string(params)?;
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.program).arg(payload).output(),
        )
        .await
        .map_err(|_| {
            anyhow!(
                "script {} timed out after {:?}",
                self.program.display(),
                self.timeout
            )
        })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "script {} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let trimmed = stdout.trim();
        Ok(serde_json::from_str(trimmed)
            .unwrap_or_else(|_| json!({ "success": true, "stdout": trimmed })))
    }
}
