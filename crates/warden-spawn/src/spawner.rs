use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use warden_core::{ErrorType, ModelId, Result, WardenError, classify};

/// A started unit of work on some model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub session_id: String,
    pub model: ModelId,
    pub label: String,
}

/// The session-spawning primitive warden drives. How a session executes is
/// the runtime's business; an error here is just text to classify.
#[async_trait]
pub trait SessionSpawner: Send + Sync {
    fn name(&self) -> &str;

    async fn spawn(&self, task: &str, model: &str, label: &str) -> Result<SessionHandle>;
}

/// Spawns sessions through an external CLI, e.g.
/// `openclaw sessions spawn --model {model} --label {label} --json`.
/// The task text is written to the child's stdin.
pub struct CommandSpawner {
    command: String,
    args: Vec<String>,
}

impl CommandSpawner {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    fn render_args(&self, model: &str, label: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace("{model}", model).replace("{label}", label))
            .collect()
    }
}

#[async_trait]
impl SessionSpawner for CommandSpawner {
    fn name(&self) -> &str {
        &self.command
    }

    async fn spawn(&self, task: &str, model: &str, label: &str) -> Result<SessionHandle> {
        let args = self.render_args(model, label);
        debug!(command = %self.command, ?args, "spawning session");

        let mut child = tokio::process::Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WardenError::Spawn(format!("{}: {e}", self.command)))?;

        // Feed stdin while draining stdout/stderr; a child that prints before
        // it has read the whole task would otherwise fill its pipe and stall.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // A child that exits without reading stdin is judged by its exit status.
                if let Err(e) = stdin.write_all(task.as_bytes()).await {
                    debug!(error = %e, "spawner did not take the task on stdin");
                }
            }
        };
        let ((), output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() };
            return Err(typed_failure(format!("{}: {detail}", output.status)));
        }

        let session_id = parse_session_id(&stdout)
            .ok_or_else(|| WardenError::Spawn("spawner printed no session id".into()))?;
        Ok(SessionHandle {
            session_id,
            model: model.to_string(),
            label: label.to_string(),
        })
    }
}

/// Lift a failed run's text into the typed variant its classification
/// names, so callers matching on [`WardenError`] see what went wrong.
fn typed_failure(text: String) -> WardenError {
    match classify(&text) {
        ErrorType::RateLimit => WardenError::RateLimited(text),
        ErrorType::Timeout => WardenError::Timeout(text),
        ErrorType::ModelUnavailable => WardenError::ModelUnavailable(text),
        ErrorType::Unknown => WardenError::Spawn(text),
    }
}

/// Session id from spawner output: a JSON object's `sessionId`,
/// `session_id`, `sessionKey` or `id`, else the last non-empty line.
pub fn parse_session_id(stdout: &str) -> Option<String> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(serde_json::Value::Object(obj)) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return ["sessionId", "session_id", "sessionKey", "id"]
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
    }
    trimmed.lines().rev().find(|l| !l.trim().is_empty()).map(|l| l.trim().to_string())
}
