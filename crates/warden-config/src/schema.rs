use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use warden_core::{AlertSeverity, AlertTable, ErrorCategory, ModelId, Thresholds};

/// Root configuration, mapped to `warden.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub models: ModelsConfig,
    pub thresholds: Thresholds,
    pub alerts: AlertTable,
    pub collectors: CollectorsConfig,
    pub spawn: SpawnConfig,
    pub state: StateConfig,
    pub notify: NotifyConfig,
    pub logging: LoggingConfig,
}

// ── Models ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Preferred model, e.g. "anthropic/claude-opus-4-6".
    pub primary: ModelId,
    /// Ordered alternates tried after the primary.
    pub fallback_chain: Vec<ModelId>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            primary: "anthropic/claude-opus-4-6".into(),
            fallback_chain: vec![
                "openai/gpt-5".into(),
                "gemini/gemini-2.5-pro".into(),
                "ollama/llama3".into(),
            ],
        }
    }
}

impl ModelsConfig {
    /// Primary followed by the fallback chain, duplicates removed.
    pub fn roster(&self) -> Vec<ModelId> {
        let mut out: Vec<ModelId> = Vec::with_capacity(self.fallback_chain.len() + 1);
        for m in std::iter::once(&self.primary).chain(self.fallback_chain.iter()) {
            if !m.is_empty() && !out.contains(m) {
                out.push(m.clone());
            }
        }
        out
    }
}

// ── Collectors ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorsConfig {
    /// Per-collector time budget.
    pub timeout_ms: u64,
    /// Auth-profile / usage store holding `cooldownUntil` per provider.
    pub cooldown_store: Option<PathBuf>,
    /// Gateway and error logs to scan.
    pub log_files: Vec<PathBuf>,
    /// Trailing window for log scanning.
    pub log_window_secs: u64,
    /// Only the last this-many bytes of each log are read.
    pub log_tail_bytes: u64,
    pub patterns: PatternsConfig,
    pub probe: ProbeConfig,
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            cooldown_store: None,
            log_files: vec![],
            log_window_secs: 300,
            log_tail_bytes: 256 * 1024,
            patterns: PatternsConfig::default(),
            probe: ProbeConfig::default(),
        }
    }
}

/// Substrings that mark a log line as a given error category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternsConfig {
    pub rate_limit: Vec<String>,
    pub failover_error: Vec<String>,
    pub unavailable: Vec<String>,
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            rate_limit: vec!["rate_limit".into()],
            failover_error: vec!["FailoverError".into()],
            unavailable: vec!["all models in cooldown".into()],
        }
    }
}

impl PatternsConfig {
    pub fn by_category(&self) -> [(ErrorCategory, &[String]); 3] {
        [
            (ErrorCategory::RateLimit, self.rate_limit.as_slice()),
            (ErrorCategory::FailoverError, self.failover_error.as_slice()),
            (ErrorCategory::Unavailable, self.unavailable.as_slice()),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Live probes burn real quota; off unless asked for.
    pub enabled: bool,
    /// Output token budget per probe.
    pub max_tokens: u32,
    pub timeout_ms: u64,
    pub targets: Vec<ProbeTarget>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_tokens: 1,
            timeout_ms: 4_000,
            targets: vec![],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Anthropic,
    /// Any OpenAI-compatible `/chat/completions` endpoint.
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub provider: String,
    pub kind: ProbeKind,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

// ── Spawn ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Attempts on one model after rate-limit errors before advancing.
    pub max_retries: u32,
    /// Delay between same-model attempts.
    pub retry_delay_secs: u64,
    /// Extra attempts after a timeout.
    pub timeout_retries: u32,
    /// Extra attempts after an unclassified error (exponential backoff).
    pub unknown_retries: u32,
    /// Upper bound on a single spawn attempt.
    pub attempt_timeout_secs: u64,
    /// External session spawner. `{model}` and `{label}` in `args` are
    /// substituted; the task text is written to stdin.
    pub command: String,
    pub args: Vec<String>,
    /// Default for `batch`: only failing tasks go through the fallback chain.
    pub partial_substitution: bool,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_secs: 5,
            timeout_retries: 1,
            unknown_retries: 2,
            attempt_timeout_secs: 120,
            command: "openclaw".into(),
            args: vec![
                "sessions".into(),
                "spawn".into(),
                "--model".into(),
                "{model}".into(),
                "--label".into(),
                "{label}".into(),
                "--json".into(),
            ],
            partial_substitution: true,
        }
    }
}

// ── State ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Directory for the snapshot, decision log and tick lock.
    pub dir: PathBuf,
    pub state_file: String,
    pub decision_log: String,
    pub lock_file: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".warden"),
            state_file: "health-state.json".into(),
            decision_log: "fallback-decisions.jsonl".into(),
            lock_file: "tick.lock".into(),
        }
    }
}

impl StateConfig {
    pub fn state_path(&self) -> PathBuf {
        self.dir.join(&self.state_file)
    }

    pub fn decision_log_path(&self) -> PathBuf {
        self.dir.join(&self.decision_log)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(&self.lock_file)
    }
}

// ── Notify ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Log,
    Webhook,
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub sink: SinkKind,
    pub webhook_url: Option<String>,
    /// For `sink = "command"`: `{message}` and `{severity}` in `args` are substituted.
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Alerts below this severity are not delivered.
    pub min_severity: AlertSeverity,
    pub timeout_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Log,
            webhook_url: None,
            command: None,
            args: vec![],
            min_severity: AlertSeverity::Low,
            timeout_ms: 5_000,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "[{}] {}: {}", tag, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl WardenConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Models ───
        if self.models.primary.is_empty() {
            warnings.push(ConfigWarning {
                field: "models.primary".into(),
                message: "primary model is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'anthropic/claude-opus-4-6'".into()),
            });
        }
        for m in self.models.roster() {
            if !m.contains('/') {
                warnings.push(ConfigWarning {
                    field: "models".into(),
                    message: format!("model '{}' should be in 'provider/model' format", m),
                    severity: WarningSeverity::Warning,
                    hint: Some("The provider prefix is what cooldowns and probes are keyed on".into()),
                });
            }
        }
        if self.models.fallback_chain.is_empty() {
            warnings.push(ConfigWarning {
                field: "models.fallback_chain".into(),
                message: "no fallback models — spawns fail as soon as the primary does".into(),
                severity: WarningSeverity::Info,
                hint: None,
            });
        }

        // ── Thresholds & alerts ───
        for (field, reason) in self.thresholds.problems() {
            warnings.push(ConfigWarning {
                field,
                message: reason,
                severity: WarningSeverity::Error,
                hint: None,
            });
        }
        let missing = self.alerts.missing();
        if !missing.is_empty() {
            let pairs: Vec<String> = missing.iter().map(|(a, b)| format!("{a}->{b}")).collect();
            warnings.push(ConfigWarning {
                field: "alerts.transitions".into(),
                message: format!("no severity for transitions: {}", pairs.join(", ")),
                severity: WarningSeverity::Error,
                hint: Some("Every change between healthy, degraded and critical needs a row".into()),
            });
        }
        for s in self.alerts.self_transitions() {
            warnings.push(ConfigWarning {
                field: "alerts.transitions".into(),
                message: format!("rule {s}->{s} is ignored; unchanged states never alert"),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Collectors ───
        if self.collectors.timeout_ms == 0 {
            warnings.push(ConfigWarning {
                field: "collectors.timeout_ms".into(),
                message: "collector timeout is 0 — every collector would time out".into(),
                severity: WarningSeverity::Error,
                hint: Some("A few seconds (e.g. 5000) is typical".into()),
            });
        }
        let probe = &self.collectors.probe;
        if probe.enabled {
            if probe.targets.is_empty() {
                warnings.push(ConfigWarning {
                    field: "collectors.probe.targets".into(),
                    message: "probing enabled but no targets configured".into(),
                    severity: WarningSeverity::Warning,
                    hint: None,
                });
            }
            if probe.max_tokens > 16 {
                warnings.push(ConfigWarning {
                    field: "collectors.probe.max_tokens".into(),
                    message: format!("probe budget of {} tokens spends real quota every tick", probe.max_tokens),
                    severity: WarningSeverity::Warning,
                    hint: Some("1 token is enough to prove the provider answers".into()),
                });
            }
            if probe.timeout_ms == 0 || probe.timeout_ms > 10_000 {
                warnings.push(ConfigWarning {
                    field: "collectors.probe.timeout_ms".into(),
                    message: format!("probe timeout {}ms is outside 1-10000", probe.timeout_ms),
                    severity: WarningSeverity::Error,
                    hint: Some("Probes must be short so one slow provider cannot stall a tick".into()),
                });
            }
        }

        // ── Spawn ───
        if self.spawn.max_retries == 0 {
            warnings.push(ConfigWarning {
                field: "spawn.max_retries".into(),
                message: "max_retries is 0 — rate-limited models would never be attempted".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 3".into()),
            });
        }
        if self.spawn.command.is_empty() {
            warnings.push(ConfigWarning {
                field: "spawn.command".into(),
                message: "no session spawner command configured".into(),
                severity: WarningSeverity::Warning,
                hint: Some("`warden spawn` needs a command that starts a session".into()),
            });
        }

        // ── Notify ───
        match self.notify.sink {
            SinkKind::Webhook if self.notify.webhook_url.is_none() => {
                warnings.push(ConfigWarning {
                    field: "notify.webhook_url".into(),
                    message: "webhook sink selected but no URL set".into(),
                    severity: WarningSeverity::Error,
                    hint: Some("Set notify.webhook_url or WARDEN_NOTIFY_WEBHOOK".into()),
                });
            }
            SinkKind::Command if self.notify.command.is_none() => {
                warnings.push(ConfigWarning {
                    field: "notify.command".into(),
                    message: "command sink selected but no command set".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
            _ => {}
        }

        // ── Logging format ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        // Check for hard errors
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
