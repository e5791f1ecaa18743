use std::path::{Path, PathBuf};
use tracing::{info, warn};

use warden_core::{Result, WardenError};

use crate::schema::WardenConfig;

/// Loads the warden configuration from disk and the environment.
pub struct ConfigLoader {
    config: WardenConfig,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > WARDEN_CONFIG env > ~/.warden/warden.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("WARDEN_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".warden")
            .join("warden.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw, &config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            WardenConfig::default()
        };

        let config = Self::apply_env_overrides(config, |key| std::env::var(key).ok());

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(WardenError::Config(e));
            }
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    fn parse(raw: &str, path: &Path) -> Result<WardenConfig> {
        toml::from_str::<WardenConfig>(raw).map_err(|e| {
            WardenError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Get a snapshot of the loaded config.
    pub fn get(&self) -> WardenConfig {
        self.config.clone()
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply overrides (WARDEN_PRIMARY_MODEL, WARDEN_FALLBACK_CHAIN, ...).
    /// `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_env_overrides<F>(mut config: WardenConfig, lookup: F) -> WardenConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("WARDEN_PRIMARY_MODEL") {
            config.models.primary = v;
        }
        if let Some(v) = lookup("WARDEN_FALLBACK_CHAIN") {
            config.models.fallback_chain = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("WARDEN_STATE_DIR") {
            config.state.dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("WARDEN_LOG_LEVEL") {
            config.logging.level = v;
        }
        // Env fills in the webhook only when the file leaves it unset.
        if config.notify.webhook_url.is_none()
            && let Some(v) = lookup("WARDEN_NOTIFY_WEBHOOK")
        {
            config.notify.webhook_url = Some(v);
        }
        config
    }
}
