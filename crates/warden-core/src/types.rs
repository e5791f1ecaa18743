use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Provider identifier, e.g. "anthropic", "openai", "gemini".
pub type ProviderId = String;

/// Model identifier in "provider/model" form, e.g. "openai/gpt-5".
pub type ModelId = String;

/// Provider part of a model id: the prefix before `/`, or the whole id.
pub fn provider_of(model: &str) -> &str {
    model.split_once('/').map(|(p, _)| p).unwrap_or(model)
}

// ── Per-provider classification ────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Degraded,
    Down,
    Unknown,
}

impl Health {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Down => "down",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaStatus {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl QuotaStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Unknown => "unknown",
        }
    }
}

/// Provenance of a [`QuotaStatus`] judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaSource {
    /// Read from the provider itself (probe response headers).
    Direct,
    /// Inferred from heuristics such as log scraping.
    Estimated,
    /// No signal was available.
    Unavailable,
}

impl QuotaSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Estimated => "estimated",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub health: Health,
    pub quota_status: QuotaStatus,
    pub quota_source: QuotaSource,
}

// ── Aggregate classification ───────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Critical,
}

impl HealthState {
    pub const ALL: [HealthState; 3] = [Self::Healthy, Self::Degraded, Self::Critical];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaRisk {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for QuotaRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

// ── Raw signals ────────────────────────────────────────────────

/// Category of an error observed in gateway logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    RateLimit,
    FailoverError,
    Unavailable,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::FailoverError => "failover_error",
            Self::Unavailable => "unavailable",
        }
    }
}

pub type ErrorCounts = BTreeMap<ErrorCategory, u32>;

/// Outcome of one minimal live inference call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub ok: bool,
    pub endpoint: String,
    pub latency_ms: u64,
    /// Failure text (HTTP status line or transport error) when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Remaining request quota as a percentage, when the provider reported it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_remaining_pct: Option<f64>,
}

/// One provider's observed state at a point in time. Rebuilt every tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSignal {
    pub provider_id: ProviderId,
    pub cooldown_until: Option<DateTime<Utc>>,
    /// `None` when no log source could be read this tick.
    pub recent_error_counts: Option<ErrorCounts>,
    pub probe_result: Option<ProbeResult>,
    /// Whether the cooldown store was readable this tick.
    #[serde(skip)]
    pub cooldown_known: bool,
}

impl ProviderSignal {
    pub fn new(provider_id: impl Into<ProviderId>) -> Self {
        Self {
            provider_id: provider_id.into(),
            cooldown_until: None,
            recent_error_counts: None,
            probe_result: None,
            cooldown_known: false,
        }
    }

    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    pub fn error_count(&self, category: ErrorCategory) -> u32 {
        self.recent_error_counts
            .as_ref()
            .and_then(|c| c.get(&category).copied())
            .unwrap_or(0)
    }
}
