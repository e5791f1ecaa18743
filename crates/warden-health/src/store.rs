//! Persisted [`SystemHealthState`] snapshot and the tick lock.
//!
//! The snapshot is one JSON document replaced atomically (temp file in the
//! same directory, fsync, rename), so a concurrent reader sees either the old
//! or the new state, never a partial write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use warden_core::{HealthState, ModelId, QuotaRisk, Result, WardenError};

/// Schema version written by this build.
pub const STATE_VERSION: u32 = 1;

/// The system-wide snapshot compared across ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealthState {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub health_state: HealthState,
    pub quota_risk: QuotaRisk,
    /// `None` when no model is available.
    pub recommended_model: Option<ModelId>,
    pub cooldown_models: Vec<ModelId>,
    pub available_models: Vec<ModelId>,
    /// Last health state an alert was actually emitted for.
    pub last_alert_state: HealthState,
}

impl SystemHealthState {
    /// State assumed before the first tick: healthy, nothing alerted yet.
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            version: STATE_VERSION,
            timestamp: now,
            health_state: HealthState::Healthy,
            quota_risk: QuotaRisk::Low,
            recommended_model: None,
            cooldown_models: vec![],
            available_models: vec![],
            last_alert_state: HealthState::Healthy,
        }
    }
}

/// Load/save seam for the snapshot.
pub trait StateStore: Send + Sync {
    /// `Ok(None)` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<SystemHealthState>>;
    fn save(&self, state: &SystemHealthState) -> Result<()>;

    /// Load, replacing a missing or unreadable snapshot with the initial
    /// state. Used by the tick, which must always produce a classification.
    fn load_or_initial(&self, now: DateTime<Utc>) -> SystemHealthState {
        match self.load() {
            Ok(Some(state)) => state,
            Ok(None) => {
                debug!("no persisted state, starting fresh");
                SystemHealthState::initial(now)
            }
            Err(e) => {
                warn!(error = %e, "persisted state unusable, starting fresh");
                SystemHealthState::initial(now)
            }
        }
    }
}

/// Snapshot stored as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> Result<Option<SystemHealthState>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state: SystemHealthState = serde_json::from_str(&raw).map_err(|e| {
            WardenError::StateStore(format!("{}: {}", self.path.display(), e))
        })?;
        if state.version > STATE_VERSION {
            return Err(WardenError::StateStore(format!(
                "{} has schema version {}, this build understands up to {}",
                self.path.display(),
                state.version,
                STATE_VERSION
            )));
        }
        Ok(Some(state))
    }

    fn save(&self, state: &SystemHealthState) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, state)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| WardenError::StateStore(format!("{}: {}", self.path.display(), e.error)))?;
        debug!(path = %self.path.display(), state = %state.health_state, "state persisted");
        Ok(())
    }
}

// ── Tick lock ──────────────────────────────────────────────────

/// Exclusive advisory lock held for the duration of one tick. Released on drop.
#[derive(Debug)]
pub struct TickLock {
    _file: File,
    path: PathBuf,
}

impl TickLock {
    /// Try to take the lock without blocking. `Ok(None)` means another tick
    /// holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        match file.try_lock() {
            Ok(()) => Ok(Some(Self {
                _file: file,
                path: path.to_path_buf(),
            })),
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Error(e)) => {
                Err(WardenError::Lock(format!("{}: {e}", path.display())))
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
