//! Table-driven severity lookups.
//!
//! The numbers live in [`Thresholds`] and [`AlertTable`], both deserialized
//! from `warden.toml`, so tuning never needs a code change.

use serde::{Deserialize, Serialize};

use crate::types::{AlertSeverity, HealthState, QuotaRisk};

/// Count at which a signal reaches each risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelThresholds {
    pub medium: u32,
    pub high: u32,
    pub critical: u32,
}

impl LevelThresholds {
    pub fn level(&self, count: u32) -> QuotaRisk {
        if count >= self.critical {
            QuotaRisk::Critical
        } else if count >= self.high {
            QuotaRisk::High
        } else if count >= self.medium {
            QuotaRisk::Medium
        } else {
            QuotaRisk::Low
        }
    }

    fn is_ordered(&self) -> bool {
        0 < self.medium && self.medium <= self.high && self.high <= self.critical
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Rate-limit hits in the log window.
    pub rate_limit: LevelThresholds,
    /// Providers currently cooling down.
    pub cooldown: LevelThresholds,
    /// With the primary model unavailable, at most this many available
    /// models still counts as degraded rather than healthy.
    pub degraded_max_available: usize,
    /// Probe-reported remaining quota (percent) at or below which a provider
    /// is flagged `warning`.
    pub quota_warning_pct: f64,
    /// Same, for `critical`.
    pub quota_critical_pct: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            rate_limit: LevelThresholds {
                medium: 1,
                high: 2,
                critical: 3,
            },
            cooldown: LevelThresholds {
                medium: 2,
                high: 3,
                critical: 4,
            },
            degraded_max_available: 2,
            quota_warning_pct: 20.0,
            quota_critical_pct: 5.0,
        }
    }
}

impl Thresholds {
    /// Aggregate quota risk. `all_cooling` forces `critical` regardless of
    /// counts (e.g. two configured providers, both cooling down).
    pub fn quota_risk(&self, rate_limit_count: u32, cooldown_count: u32, all_cooling: bool) -> QuotaRisk {
        if all_cooling {
            return QuotaRisk::Critical;
        }
        self.rate_limit
            .level(rate_limit_count)
            .max(self.cooldown.level(cooldown_count))
    }

    pub fn health_state(&self, available_count: usize, primary_available: bool) -> HealthState {
        if available_count == 0 {
            HealthState::Critical
        } else if !primary_available && available_count <= self.degraded_max_available {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        }
    }

    /// Problems that make the table unusable, as `(field, reason)` pairs.
    pub fn problems(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if !self.rate_limit.is_ordered() {
            out.push((
                "thresholds.rate_limit".into(),
                "levels must satisfy 0 < medium <= high <= critical".into(),
            ));
        }
        if !self.cooldown.is_ordered() {
            out.push((
                "thresholds.cooldown".into(),
                "levels must satisfy 0 < medium <= high <= critical".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.quota_warning_pct)
            || !(0.0..=100.0).contains(&self.quota_critical_pct)
            || self.quota_critical_pct > self.quota_warning_pct
        {
            out.push((
                "thresholds.quota_*_pct".into(),
                "percentages must be within 0-100 with critical <= warning".into(),
            ));
        }
        out
    }
}

// ── Alert table ────────────────────────────────────────────────

/// One row of the alert table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRule {
    pub from: HealthState,
    pub to: HealthState,
    pub severity: AlertSeverity,
}

/// Severity for every `(previous, new)` health-state pair. Unchanged pairs
/// never alert; the six changing pairs must all be present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertTable {
    pub transitions: Vec<TransitionRule>,
}

impl Default for AlertTable {
    fn default() -> Self {
        use AlertSeverity::*;
        use HealthState::*;
        let rule = |from, to, severity| TransitionRule { from, to, severity };
        Self {
            transitions: vec![
                rule(Healthy, Degraded, Medium),
                rule(Healthy, Critical, High),
                rule(Degraded, Critical, High),
                rule(Degraded, Healthy, Low),
                rule(Critical, Degraded, Medium),
                rule(Critical, Healthy, Low),
            ],
        }
    }
}

impl AlertTable {
    /// `None` means "no alert".
    pub fn severity(&self, from: HealthState, to: HealthState) -> Option<AlertSeverity> {
        if from == to {
            return None;
        }
        self.transitions
            .iter()
            .find(|r| r.from == from && r.to == to)
            .map(|r| r.severity)
            // validate() rejects incomplete tables; escalate rather than drop.
            .or(Some(AlertSeverity::High))
    }

    /// Changing pairs that have no rule.
    pub fn missing(&self) -> Vec<(HealthState, HealthState)> {
        let mut out = Vec::new();
        for from in HealthState::ALL {
            for to in HealthState::ALL {
                if from != to && !self.transitions.iter().any(|r| r.from == from && r.to == to) {
                    out.push((from, to));
                }
            }
        }
        out
    }

    /// Rules that would make an unchanged state alert.
    pub fn self_transitions(&self) -> Vec<HealthState> {
        self.transitions
            .iter()
            .filter(|r| r.from == r.to)
            .map(|r| r.from)
            .collect()
    }
}
