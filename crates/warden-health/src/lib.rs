//! # warden-health
//!
//! The monitoring half of warden. Each tick reads provider signals through
//! independently failable collectors, classifies every provider and the
//! system as a whole, persists the snapshot atomically, and alerts only when
//! the aggregate state changes.

pub mod collectors;
pub mod monitor;
pub mod notify;
pub mod store;

pub use collectors::{CollectorFailure, GatheredSignals, SignalCollector, gather};
pub use monitor::{Alert, HealthMonitor, ProviderReport, TickOutcome, TickReport, TickRunner};
pub use notify::{Notifier, notify_best_effort};
pub use store::{JsonStateStore, STATE_VERSION, StateStore, SystemHealthState, TickLock};
