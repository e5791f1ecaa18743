//! HealthMonitor: classify providers, aggregate, decide whether to alert.
//!
//! [`HealthMonitor::evaluate`] is pure: signals and the previous snapshot in,
//! new snapshot and optional alert out. [`TickRunner`] wraps it with the I/O
//! (lock, load, collect, persist, notify) in that order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use warden_config::WardenConfig;
use warden_core::{
    AlertSeverity, AlertTable, ErrorCategory, ErrorType, Health, HealthState, ModelId,
    ProviderHealth, ProviderId, ProviderSignal, QuotaRisk, QuotaSource, QuotaStatus, Result,
    Thresholds, classify, provider_of,
};

use crate::collectors::cooldown::remaining_secs;
use crate::collectors::{
    self, CooldownCollector, GatheredSignals, InferenceProbeCollector,
    LogPatternCollector, SignalCollector,
};
use crate::notify::{self, Notifier};
use crate::store::{JsonStateStore, StateStore, SystemHealthState, TickLock};

/// Classification of one provider plus the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderReport {
    pub provider_id: ProviderId,
    #[serde(flatten)]
    pub health: ProviderHealth,
    pub cooling_down: bool,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub evidence: Vec<String>,
}

/// Emitted only when the aggregate state differs from the last alerted one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub previous_state: HealthState,
    pub new_state: HealthState,
    pub severity: AlertSeverity,
    pub quota_risk: QuotaRisk,
    pub reason: String,
    pub evidence: Vec<String>,
    pub recommended_model: Option<ModelId>,
    pub recommended_action: String,
}

impl Alert {
    /// Text handed to the notification sink.
    pub fn message(&self) -> String {
        let mut out = format!(
            "[warden] model health {} -> {} ({} severity)\n",
            self.previous_state, self.new_state, self.severity
        );
        out.push_str(&format!("Reason: {}\n", self.reason));
        out.push_str(&format!("Quota risk: {}\n", self.quota_risk));
        if !self.evidence.is_empty() {
            out.push_str("Evidence:\n");
            for line in &self.evidence {
                out.push_str(&format!("  - {line}\n"));
            }
        }
        out.push_str(&format!("Action: {}", self.recommended_action));
        out
    }
}

/// Result of one evaluation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickOutcome {
    pub state: SystemHealthState,
    pub alert: Option<Alert>,
    pub providers: Vec<ProviderReport>,
    /// Collectors that produced nothing this tick, as `(name, reason)`.
    pub degraded_collectors: Vec<(String, String)>,
}

pub struct HealthMonitor {
    /// `[primary] ++ fallback chain`, deduplicated; the priority order.
    roster: Vec<ModelId>,
    thresholds: Thresholds,
    alerts: AlertTable,
}

impl HealthMonitor {
    pub fn new(roster: Vec<ModelId>, thresholds: Thresholds, alerts: AlertTable) -> Self {
        Self {
            roster,
            thresholds,
            alerts,
        }
    }

    pub fn from_config(config: &WardenConfig) -> Self {
        Self::new(
            config.models.roster(),
            config.thresholds.clone(),
            config.alerts.clone(),
        )
    }

    pub fn primary(&self) -> Option<&ModelId> {
        self.roster.first()
    }

    /// Distinct providers behind the roster, in roster order.
    pub fn providers(&self) -> Vec<ProviderId> {
        let mut out: Vec<ProviderId> = Vec::new();
        for model in &self.roster {
            let p = provider_of(model);
            if !out.iter().any(|seen| seen == p) {
                out.push(p.to_string());
            }
        }
        out
    }

    /// Classify one provider. A probe result, when present, decides `health`;
    /// cooldowns and log counts only fill in when there is no probe.
    pub fn assess(&self, signal: &ProviderSignal, now: DateTime<Utc>) -> ProviderReport {
        let cooling = signal.is_cooling_down(now);
        let mut evidence = Vec::new();
        if cooling && let Some(until) = signal.cooldown_until {
            let left = remaining_secs(until, now);
            evidence.push(format!("cooling down for another {left}s"));
        }
        for category in [ErrorCategory::RateLimit, ErrorCategory::FailoverError, ErrorCategory::Unavailable] {
            let n = signal.error_count(category);
            if n > 0 {
                evidence.push(format!("{n} {} log line(s) in window", category.as_str()));
            }
        }

        let estimated = self.estimated_quota(signal);
        let (health, quota_status, quota_source) = match &signal.probe_result {
            Some(probe) if probe.ok => {
                evidence.push(format!("probe ok in {}ms", probe.latency_ms));
                let (status, source) = match probe.quota_remaining_pct {
                    Some(pct) => (self.quota_from_pct(pct), QuotaSource::Direct),
                    // A completed call means quota is not exhausted.
                    None => estimated.unwrap_or((QuotaStatus::Ok, QuotaSource::Estimated)),
                };
                (Health::Healthy, status, source)
            }
            Some(probe) => {
                let error = probe.error.as_deref().unwrap_or("probe failed");
                evidence.push(format!("probe failed: {error}"));
                match classify(error) {
                    ErrorType::RateLimit => (Health::Degraded, QuotaStatus::Critical, QuotaSource::Direct),
                    _ => {
                        let (status, source) = match probe.quota_remaining_pct {
                            Some(pct) => (self.quota_from_pct(pct), QuotaSource::Direct),
                            None => estimated.unwrap_or((QuotaStatus::Unknown, QuotaSource::Unavailable)),
                        };
                        (Health::Down, status, source)
                    }
                }
            }
            None => {
                let health = if cooling {
                    Health::Down
                } else if signal.error_count(ErrorCategory::RateLimit) > 0
                    || signal.error_count(ErrorCategory::FailoverError) > 0
                {
                    Health::Degraded
                } else if !signal.cooldown_known && signal.recent_error_counts.is_none() {
                    evidence.push("no signal source readable".into());
                    Health::Unknown
                } else {
                    Health::Healthy
                };
                let (status, source) = estimated.unwrap_or((QuotaStatus::Unknown, QuotaSource::Unavailable));
                (health, status, source)
            }
        };

        ProviderReport {
            provider_id: signal.provider_id.clone(),
            health: ProviderHealth {
                health,
                quota_status,
                quota_source,
            },
            cooling_down: cooling,
            cooldown_until: signal.cooldown_until.filter(|_| cooling),
            evidence,
        }
    }

    /// Quota judgment from log counts, `None` when no log was read.
    fn estimated_quota(&self, signal: &ProviderSignal) -> Option<(QuotaStatus, QuotaSource)> {
        signal.recent_error_counts.as_ref()?;
        let status = match self
            .thresholds
            .rate_limit
            .level(signal.error_count(ErrorCategory::RateLimit))
        {
            QuotaRisk::Low => QuotaStatus::Ok,
            QuotaRisk::Medium | QuotaRisk::High => QuotaStatus::Warning,
            QuotaRisk::Critical => QuotaStatus::Critical,
        };
        Some((status, QuotaSource::Estimated))
    }

    fn quota_from_pct(&self, pct: f64) -> QuotaStatus {
        if pct <= self.thresholds.quota_critical_pct {
            QuotaStatus::Critical
        } else if pct <= self.thresholds.quota_warning_pct {
            QuotaStatus::Warning
        } else {
            QuotaStatus::Ok
        }
    }

    /// One monitoring pass over already-collected signals. Never fails.
    pub fn evaluate(
        &self,
        gathered: &GatheredSignals,
        previous: &SystemHealthState,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        let reports: Vec<ProviderReport> = gathered
            .signals
            .iter()
            .map(|s| self.assess(s, now))
            .collect();
        let report_for = |provider: &str| reports.iter().find(|r| r.provider_id == provider);

        let mut available_models = Vec::new();
        let mut cooldown_models = Vec::new();
        for model in &self.roster {
            let Some(report) = report_for(provider_of(model)) else {
                continue;
            };
            if report.cooling_down {
                cooldown_models.push(model.clone());
            }
            // Unknown is excluded: better to under-report availability than
            // to recommend a broken provider.
            let usable = matches!(report.health.health, Health::Healthy | Health::Degraded);
            if usable && !report.cooling_down {
                available_models.push(model.clone());
            }
        }

        let primary_available = self
            .primary()
            .is_some_and(|p| available_models.contains(p));
        let health_state = self
            .thresholds
            .health_state(available_models.len(), primary_available);

        let cooling_providers = reports.iter().filter(|r| r.cooling_down).count();
        let all_cooling = !reports.is_empty() && cooling_providers == reports.len();
        let probe_rate_limits = reports
            .iter()
            .filter(|r| r.health.health == Health::Degraded && r.health.quota_source == QuotaSource::Direct)
            .count();
        let rate_limit_count = gathered
            .log_totals
            .as_ref()
            .and_then(|t| t.get(&ErrorCategory::RateLimit).copied())
            .unwrap_or(0)
            + probe_rate_limits as u32;
        let quota_risk =
            self.thresholds
                .quota_risk(rate_limit_count, cooling_providers as u32, all_cooling);

        let recommended_model = available_models.first().cloned();

        let degraded_collectors: Vec<(String, String)> = gathered
            .failures
            .iter()
            .map(|(name, failure)| (name.clone(), failure.to_string()))
            .collect();

        // Quota exhaustion with at most one model left is urgent: it raises
        // any transition alert to high, and crossing into it alerts on its
        // own. The persisted quota risk keeps the crossing from repeating.
        let quota_urgent = quota_risk == QuotaRisk::Critical && available_models.len() <= 1;
        let quota_crossing = quota_urgent && previous.quota_risk != QuotaRisk::Critical;
        let transition = self.alerts.severity(previous.last_alert_state, health_state);
        let severity = match transition {
            Some(_) if quota_urgent => Some(AlertSeverity::High),
            None if quota_crossing => Some(AlertSeverity::High),
            other => other,
        };

        let alert = severity.map(|severity| {
            let mut reason = self.reason(health_state, &available_models, primary_available);
            if quota_crossing {
                reason = format!("quota risk critical with {} model(s) available; {reason}", available_models.len());
            }
            Alert {
                timestamp: now,
                previous_state: previous.last_alert_state,
                new_state: health_state,
                severity,
                quota_risk,
                reason,
                evidence: evidence_lines(&reports, &degraded_collectors),
                recommended_model: recommended_model.clone(),
                recommended_action: self.action(health_state, recommended_model.as_deref(), &reports),
            }
        });

        let state = SystemHealthState {
            version: crate::store::STATE_VERSION,
            timestamp: now,
            health_state,
            quota_risk,
            recommended_model,
            cooldown_models,
            available_models,
            last_alert_state: if alert.is_some() {
                health_state
            } else {
                previous.last_alert_state
            },
        };

        debug!(
            state = %state.health_state,
            quota_risk = %state.quota_risk,
            available = state.available_models.len(),
            alert = alert.is_some(),
            "tick evaluated"
        );

        TickOutcome {
            state,
            alert,
            providers: reports,
            degraded_collectors,
        }
    }

    fn reason(&self, state: HealthState, available: &[ModelId], primary_available: bool) -> String {
        let total = self.roster.len();
        match state {
            HealthState::Critical => format!("no model available (0 of {total})"),
            HealthState::Degraded => format!(
                "primary model {} unavailable, {} of {total} models available",
                self.primary().map(String::as_str).unwrap_or("(none)"),
                available.len()
            ),
            HealthState::Healthy if primary_available => {
                format!("primary model available, {} of {total} models available", available.len())
            }
            HealthState::Healthy => format!("{} of {total} models available", available.len()),
        }
    }

    fn action(&self, state: HealthState, recommended: Option<&str>, reports: &[ProviderReport]) -> String {
        match (state, recommended) {
            (HealthState::Critical, _) => {
                let earliest = reports.iter().filter_map(|r| r.cooldown_until).min();
                match earliest {
                    Some(t) => format!(
                        "no usable model; earliest cooldown expires at {}, check provider status and credentials",
                        t.to_rfc3339()
                    ),
                    None => "no usable model; check provider status and credentials".into(),
                }
            }
            (HealthState::Degraded, Some(model)) => format!("route new work to {model}"),
            (HealthState::Healthy, Some(model)) => format!("none, {model} is serving"),
            (_, None) => "no recommendation available".into(),
        }
    }
}

fn evidence_lines(reports: &[ProviderReport], failures: &[(String, String)]) -> Vec<String> {
    let mut out: Vec<String> = reports
        .iter()
        .map(|r| {
            let mut line = format!(
                "{}: {}, quota {} ({})",
                r.provider_id,
                r.health.health.as_str(),
                r.health.quota_status.as_str(),
                r.health.quota_source.as_str()
            );
            if !r.evidence.is_empty() {
                line.push_str(" - ");
                line.push_str(&r.evidence.join("; "));
            }
            line
        })
        .collect();
    for (name, why) in failures {
        out.push(format!("collector {name} degraded: {why}"));
    }
    out
}

// ── Tick runner ────────────────────────────────────────────────

/// What a tick did.
#[derive(Debug)]
pub enum TickReport {
    /// Another tick held the lock.
    Skipped,
    Completed(TickOutcome),
}

/// One full monitoring pass with all I/O at the edges.
pub struct TickRunner {
    monitor: HealthMonitor,
    collectors: Vec<Box<dyn SignalCollector>>,
    store: Box<dyn StateStore>,
    lock_path: Option<PathBuf>,
    collector_timeout: Duration,
    notifier: Box<dyn Notifier>,
    min_severity: AlertSeverity,
}

impl TickRunner {
    pub fn new(
        monitor: HealthMonitor,
        collectors: Vec<Box<dyn SignalCollector>>,
        store: Box<dyn StateStore>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            monitor,
            collectors,
            store,
            lock_path: None,
            collector_timeout: Duration::from_secs(5),
            notifier,
            min_severity: AlertSeverity::Low,
        }
    }

    pub fn with_lock(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(path.into());
        self
    }

    pub fn with_collector_timeout(mut self, timeout: Duration) -> Self {
        self.collector_timeout = timeout;
        self
    }

    pub fn with_min_severity(mut self, severity: AlertSeverity) -> Self {
        self.min_severity = severity;
        self
    }

    /// Wire collectors, store, lock and notifier from configuration.
    pub fn from_config(config: &WardenConfig) -> Result<Self> {
        let c = &config.collectors;
        let mut collectors: Vec<Box<dyn SignalCollector>> = Vec::new();
        if let Some(ref store) = c.cooldown_store {
            collectors.push(Box::new(CooldownCollector::new(store.clone())));
        }
        if !c.log_files.is_empty() {
            let patterns = c
                .patterns
                .by_category()
                .into_iter()
                .map(|(cat, needles)| (cat, needles.to_vec()))
                .collect();
            collectors.push(Box::new(LogPatternCollector::new(
                c.log_files.clone(),
                chrono::Duration::seconds(c.log_window_secs as i64),
                c.log_tail_bytes,
                patterns,
            )));
        }
        if c.probe.enabled {
            collectors.push(Box::new(InferenceProbeCollector::new(
                c.probe.targets.clone(),
                c.probe.max_tokens,
                Duration::from_millis(c.probe.timeout_ms),
            )?));
        }
        if collectors.is_empty() {
            warn!("no signal collectors configured, every provider will be unknown");
        }

        Ok(Self::new(
            HealthMonitor::from_config(config),
            collectors,
            Box::new(JsonStateStore::new(config.state.state_path())),
            notify::from_config(&config.notify)?,
        )
        .with_lock(config.state.lock_path())
        .with_collector_timeout(Duration::from_millis(c.timeout_ms))
        .with_min_severity(config.notify.min_severity))
    }

    /// Lock, load, collect, evaluate, persist, then notify. Health problems
    /// are never errors; only failing to persist the snapshot is.
    pub async fn run(&self) -> Result<TickReport> {
        let _lock = match &self.lock_path {
            Some(path) => match TickLock::try_acquire(path)? {
                Some(lock) => {
                    debug!(lock = %lock.path().display(), "tick lock acquired");
                    Some(lock)
                }
                None => {
                    info!(lock = %path.display(), "another tick is running, skipping");
                    return Ok(TickReport::Skipped);
                }
            },
            None => None,
        };

        let now = Utc::now();
        let previous = self.store.load_or_initial(now);
        let providers = self.monitor.providers();
        let gathered =
            collectors::gather(&self.collectors, &providers, self.collector_timeout).await;
        let outcome = self.monitor.evaluate(&gathered, &previous, now);

        // Persist first: a crash after this point cannot re-alert.
        self.store.save(&outcome.state)?;

        info!(
            state = %outcome.state.health_state,
            quota_risk = %outcome.state.quota_risk,
            recommended = outcome.state.recommended_model.as_deref().unwrap_or("none"),
            "tick complete"
        );

        if let Some(ref alert) = outcome.alert {
            notify::notify_best_effort(self.notifier.as_ref(), alert, self.min_severity).await;
        }
        Ok(TickReport::Completed(outcome))
    }
}
