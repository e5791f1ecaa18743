//! Notification sinks. Delivery is best-effort: a failed notification is
//! logged and never fails the tick.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, warn};

use warden_config::{SinkKind, schema::NotifyConfig};
use warden_core::{AlertSeverity, Result, WardenError};

use crate::monitor::Alert;

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, message: &str, severity: AlertSeverity) -> Result<()>;
}

/// Writes the alert to the tracing output.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, message: &str, severity: AlertSeverity) -> Result<()> {
        match severity {
            AlertSeverity::High => error!(%severity, "{message}"),
            AlertSeverity::Medium => warn!(%severity, "{message}"),
            AlertSeverity::Low => info!(%severity, "{message}"),
        }
        Ok(())
    }
}

/// POSTs `{"text": …, "severity": …}` to a chat webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WardenError::Notify(format!("webhook client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, message: &str, severity: AlertSeverity) -> Result<()> {
        let body = json!({
            "text": message,
            "severity": severity,
        });
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| WardenError::Notify(format!("webhook HTTP error: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(WardenError::Notify(format!("webhook returned {status}: {text}")));
        }
        Ok(())
    }
}

/// Runs a local command, substituting `{message}` and `{severity}` in its
/// arguments.
pub struct CommandNotifier {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandNotifier {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl Notifier for CommandNotifier {
    fn name(&self) -> &str {
        "command"
    }

    async fn notify(&self, message: &str, severity: AlertSeverity) -> Result<()> {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                a.replace("{message}", message)
                    .replace("{severity}", &severity.to_string())
            })
            .collect();

        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&self.command)
                .args(&args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| WardenError::Notify(format!("{} timed out", self.command)))?
        .map_err(|e| WardenError::Notify(format!("{}: {e}", self.command)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WardenError::Notify(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Build the configured sink.
pub fn from_config(config: &NotifyConfig) -> Result<Box<dyn Notifier>> {
    let timeout = Duration::from_millis(config.timeout_ms);
    match config.sink {
        SinkKind::Log => Ok(Box::new(LogNotifier)),
        SinkKind::Webhook => {
            let url = config.webhook_url.clone().ok_or_else(|| WardenError::ConfigValidation {
                field: "notify.webhook_url".into(),
                reason: "required when sink = \"webhook\"".into(),
            })?;
            Ok(Box::new(WebhookNotifier::new(url, timeout)?))
        }
        SinkKind::Command => {
            let command = config.command.clone().ok_or_else(|| WardenError::ConfigValidation {
                field: "notify.command".into(),
                reason: "required when sink = \"command\"".into(),
            })?;
            Ok(Box::new(CommandNotifier::new(command, config.args.clone(), timeout)))
        }
    }
}

/// Deliver `alert` unless it is below `min_severity`. Returns whether the
/// sink accepted it; failures are logged, never returned.
pub async fn notify_best_effort(
    notifier: &dyn Notifier,
    alert: &Alert,
    min_severity: AlertSeverity,
) -> bool {
    if alert.severity < min_severity {
        info!(
            severity = %alert.severity,
            min = %min_severity,
            "alert below notification threshold, not sent"
        );
        return false;
    }
    match notifier.notify(&alert.message(), alert.severity).await {
        Ok(()) => {
            info!(sink = notifier.name(), severity = %alert.severity, "alert delivered");
            true
        }
        Err(e) => {
            warn!(sink = notifier.name(), error = %e, "alert delivery failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use warden_core::{HealthState, QuotaRisk};

    fn alert(severity: AlertSeverity) -> Alert {
        Alert {
            timestamp: Utc::now(),
            previous_state: HealthState::Healthy,
            new_state: HealthState::Critical,
            severity,
            quota_risk: QuotaRisk::Critical,
            reason: "no model available".into(),
            evidence: vec![],
            recommended_model: None,
            recommended_action: "wait".into(),
        }
    }

    #[tokio::test]
    async fn test_below_min_severity_is_skipped() {
        assert!(!notify_best_effort(&LogNotifier, &alert(AlertSeverity::Low), AlertSeverity::Medium).await);
        assert!(notify_best_effort(&LogNotifier, &alert(AlertSeverity::High), AlertSeverity::Medium).await);
    }

    #[tokio::test]
    async fn test_failing_command_is_swallowed() {
        let sink = CommandNotifier::new(
            "/nonexistent/warden-notify",
            vec!["{message}".into()],
            Duration::from_secs(1),
        );
        assert!(!notify_best_effort(&sink, &alert(AlertSeverity::High), AlertSeverity::Low).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_receives_substituted_args() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let sink = CommandNotifier::new(
            "sh",
            vec![
                "-c".into(),
                format!("printf '%s' \"$0\" > {}", out.display()),
                "{severity}".into(),
            ],
            Duration::from_secs(5),
        );
        sink.notify("hello", AlertSeverity::Medium).await.unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "medium");
    }

    #[tokio::test]
    async fn test_webhook_gives_up_after_timeout() {
        // Accepts the connection and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let sink = WebhookNotifier::new(format!("http://{addr}/hook"), Duration::from_millis(300)).unwrap();
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            sink.notify("hello", AlertSeverity::High),
        )
        .await
        .expect("webhook call must carry its own timeout");
        assert!(matches!(result, Err(WardenError::Notify(_))));
    }

    #[test]
    fn test_webhook_sink_requires_url() {
        let config = NotifyConfig {
            sink: SinkKind::Webhook,
            webhook_url: None,
            ..Default::default()
        };
        assert!(from_config(&config).is_err());
    }
}
