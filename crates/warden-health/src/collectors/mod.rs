//! Signal collectors.
//!
//! Each collector reads one external source and reports either an
//! [`Observation`] or a typed [`CollectorFailure`]. Failures never escape as
//! errors: [`gather`] folds whatever succeeded into per-provider
//! [`ProviderSignal`]s and records what failed, so the tick always proceeds.

pub mod cooldown;
pub mod logs;
pub mod probe;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use warden_core::{ErrorCounts, ProbeResult, ProviderId, ProviderSignal};

pub use cooldown::CooldownCollector;
pub use logs::LogPatternCollector;
pub use probe::InferenceProbeCollector;

/// Why a collector produced nothing this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorFailure {
    Unavailable(String),
    Timeout,
    ParseError(String),
}

impl fmt::Display for CollectorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(why) => write!(f, "unavailable: {why}"),
            Self::Timeout => f.write_str("timeout"),
            Self::ParseError(why) => write!(f, "parse error: {why}"),
        }
    }
}

pub type SignalResult<T> = std::result::Result<T, CollectorFailure>;

/// Cooldown expiry for a provider, `None` if it is usable now.
pub type CooldownMap = HashMap<ProviderId, Option<DateTime<Utc>>>;

/// Error counts found in the log window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogCounts {
    /// Lines that named a provider.
    pub per_provider: HashMap<ProviderId, ErrorCounts>,
    /// All matching lines, attributed or not.
    pub total: ErrorCounts,
}

/// Successful payload of one collector.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Cooldowns(CooldownMap),
    ErrorCounts(LogCounts),
    Probes(HashMap<ProviderId, ProbeResult>),
}

#[async_trait]
pub trait SignalCollector: Send + Sync {
    /// Short name used in logs and alert evidence.
    fn name(&self) -> &str;

    /// Read the source for the given providers. Implementations must not
    /// block the runtime; the caller bounds the call with a timeout.
    async fn collect(&self, providers: &[ProviderId]) -> SignalResult<Observation>;
}

/// Run one collector under `timeout`; expiry becomes [`CollectorFailure::Timeout`].
pub async fn collect_with_timeout(
    collector: &dyn SignalCollector,
    providers: &[ProviderId],
    timeout: Duration,
) -> SignalResult<Observation> {
    match tokio::time::timeout(timeout, collector.collect(providers)).await {
        Ok(result) => result,
        Err(_) => Err(CollectorFailure::Timeout),
    }
}

/// Everything the collectors produced for one tick.
#[derive(Debug, Clone, Default)]
pub struct GatheredSignals {
    /// One entry per provider, in the order requested.
    pub signals: Vec<ProviderSignal>,
    /// Sum of matching log lines across the window, `None` if no log was read.
    pub log_totals: Option<ErrorCounts>,
    /// `(collector name, failure)` for each collector that failed.
    pub failures: Vec<(String, CollectorFailure)>,
}

/// Run every collector concurrently, each under its own timeout, and merge
/// the results into per-provider signals.
pub async fn gather(
    collectors: &[Box<dyn SignalCollector>],
    providers: &[ProviderId],
    timeout: Duration,
) -> GatheredSignals {
    let results = futures::future::join_all(
        collectors
            .iter()
            .map(|c| collect_with_timeout(c.as_ref(), providers, timeout)),
    )
    .await;

    let mut by_provider: BTreeMap<&str, ProviderSignal> = providers
        .iter()
        .map(|p| (p.as_str(), ProviderSignal::new(p.clone())))
        .collect();
    let mut out = GatheredSignals::default();

    for (collector, result) in collectors.iter().zip(results) {
        match result {
            Ok(observation) => {
                debug!(collector = collector.name(), "collector succeeded");
                merge(&mut by_provider, &mut out, observation);
            }
            Err(failure) => {
                warn!(collector = collector.name(), %failure, "collector failed, continuing with reduced confidence");
                out.failures.push((collector.name().to_string(), failure));
            }
        }
    }

    out.signals = providers
        .iter()
        .filter_map(|p| by_provider.remove(p.as_str()))
        .collect();
    out
}

fn merge(
    by_provider: &mut BTreeMap<&str, ProviderSignal>,
    out: &mut GatheredSignals,
    observation: Observation,
) {
    match observation {
        Observation::Cooldowns(map) => {
            for (id, signal) in by_provider.iter_mut() {
                signal.cooldown_known = true;
                signal.cooldown_until = map.get(*id).copied().flatten();
            }
        }
        Observation::ErrorCounts(counts) => {
            for (id, signal) in by_provider.iter_mut() {
                let mine = counts.per_provider.get(*id).cloned().unwrap_or_default();
                let merged = signal.recent_error_counts.get_or_insert_with(ErrorCounts::new);
                for (category, n) in mine {
                    *merged.entry(category).or_insert(0) += n;
                }
            }
            let totals = out.log_totals.get_or_insert_with(ErrorCounts::new);
            for (category, n) in counts.total {
                *totals.entry(category).or_insert(0) += n;
            }
        }
        Observation::Probes(results) => {
            for (id, signal) in by_provider.iter_mut() {
                if let Some(result) = results.get(*id) {
                    signal.probe_result = Some(result.clone());
                }
            }
        }
    }
}
