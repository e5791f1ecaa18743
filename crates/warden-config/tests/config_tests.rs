#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use warden_config::ConfigLoader;
    use warden_config::schema::*;
    use warden_core::{AlertSeverity, ErrorCategory, HealthState, TransitionRule};

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_warden_config_defaults() {
        let config = WardenConfig::default();
        assert_eq!(config.models.primary, "anthropic/claude-opus-4-6");
        assert_eq!(config.models.fallback_chain.len(), 3);
        assert_eq!(config.spawn.max_retries, 3);
        assert_eq!(config.spawn.retry_delay_secs, 5);
        assert_eq!(config.collectors.timeout_ms, 5000);
        assert!(!config.collectors.probe.enabled);
        assert_eq!(config.collectors.probe.max_tokens, 1);
        assert_eq!(config.notify.sink, SinkKind::Log);
    }

    #[test]
    fn test_default_config_validates() {
        let warnings = WardenConfig::default().validate().unwrap();
        assert!(warnings.iter().all(|w| w.severity != WarningSeverity::Error));
    }

    #[test]
    fn test_roster_dedups_primary() {
        let models = ModelsConfig {
            primary: "openai/gpt-5".into(),
            fallback_chain: vec![
                "anthropic/claude-sonnet-4".into(),
                "openai/gpt-5".into(),
                "anthropic/claude-sonnet-4".into(),
            ],
        };
        assert_eq!(models.roster(), vec!["openai/gpt-5", "anthropic/claude-sonnet-4"]);
    }

    #[test]
    fn test_state_paths_share_dir() {
        let state = StateConfig {
            dir: "/var/lib/warden".into(),
            ..Default::default()
        };
        assert_eq!(
            state.state_path(),
            std::path::PathBuf::from("/var/lib/warden/health-state.json")
        );
        assert!(state.decision_log_path().ends_with("fallback-decisions.jsonl"));
        assert!(state.lock_path().ends_with("tick.lock"));
    }

    #[test]
    fn test_patterns_by_category() {
        let patterns = PatternsConfig::default();
        let pairs = patterns.by_category();
        assert_eq!(pairs[0].0, ErrorCategory::RateLimit);
        assert_eq!(pairs[2].1, ["all models in cooldown".to_string()]);
    }

    // ── TOML ───────────────────────────────────────────────────

    #[test]
    fn test_config_toml_roundtrip() {
        let config = WardenConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: WardenConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.models.primary, config.models.primary);
        assert_eq!(restored.thresholds, config.thresholds);
        assert_eq!(restored.alerts, config.alerts);
    }

    #[test]
    fn test_partial_toml_applies_defaults() {
        let toml_str = r#"
[models]
primary = "openai/gpt-5"

[thresholds.rate_limit]
medium = 2
high = 4
critical = 6
"#;
        let config: WardenConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.models.primary, "openai/gpt-5");
        assert_eq!(config.thresholds.rate_limit.critical, 6);
        // Untouched sections keep defaults
        assert_eq!(config.thresholds.cooldown.critical, 4);
        assert_eq!(config.models.fallback_chain.len(), 3);
        assert_eq!(config.alerts.transitions.len(), 6);
    }

    #[test]
    fn test_inference_targets_deserialize() {
        let toml_str = r#"
[collectors.probe]
enabled = true

[[collectors.probe.targets]]
provider = "anthropic"
kind = "anthropic"
base_url = "https://api.anthropic.com/v1"
model = "claude-haiku-3-5"
api_key_env = "ANTHROPIC_API_KEY"
"#;
        let config: WardenConfig = toml::from_str(toml_str).unwrap();
        assert!(config.collectors.probe.enabled);
        assert_eq!(config.collectors.probe.targets.len(), 1);
        assert_eq!(config.collectors.probe.targets[0].kind, ProbeKind::Anthropic);
        assert_eq!(config.collectors.probe.timeout_ms, 4000);
    }

    // ── Validation ─────────────────────────────────────────────

    #[test]
    fn test_incomplete_alert_table_is_rejected() {
        let mut config = WardenConfig::default();
        config.alerts.transitions = vec![TransitionRule {
            from: HealthState::Healthy,
            to: HealthState::Critical,
            severity: AlertSeverity::High,
        }];
        let err = config.validate().unwrap_err();
        assert!(err.contains("alerts.transitions"));
        assert!(err.contains("degraded->healthy"));
    }

    #[test]
    fn test_webhook_sink_needs_url() {
        let mut config = WardenConfig::default();
        config.notify.sink = SinkKind::Webhook;
        assert!(config.validate().is_err());
        config.notify.webhook_url = Some("https://hooks.example.com/x".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inference_timeout_bounds() {
        let mut config = WardenConfig::default();
        config.collectors.probe.enabled = true;
        config.collectors.probe.timeout_ms = 60_000;
        let err = config.validate().unwrap_err();
        assert!(err.contains("collectors.probe.timeout_ms"));
    }

    #[test]
    fn test_zero_max_retries_is_error() {
        let mut config = WardenConfig::default();
        config.spawn.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bare_model_name_warns() {
        let mut config = WardenConfig::default();
        config.models.fallback_chain = vec!["llama3".into()];
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.message.contains("llama3")));
    }

    // ── Env overrides ──────────────────────────────────────────

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("WARDEN_PRIMARY_MODEL", "gemini/gemini-2.5-pro"),
            ("WARDEN_FALLBACK_CHAIN", "openai/gpt-5, anthropic/claude-sonnet-4,,"),
            ("WARDEN_STATE_DIR", "/tmp/warden-state"),
            ("WARDEN_NOTIFY_WEBHOOK", "https://hooks.example.com/env"),
        ]
        .into_iter()
        .collect();
        let config = ConfigLoader::apply_env_overrides(WardenConfig::default(), |k| {
            env.get(k).map(|v| v.to_string())
        });
        assert_eq!(config.models.primary, "gemini/gemini-2.5-pro");
        assert_eq!(
            config.models.fallback_chain,
            vec!["openai/gpt-5", "anthropic/claude-sonnet-4"]
        );
        assert_eq!(config.state.dir, std::path::PathBuf::from("/tmp/warden-state"));
        assert_eq!(
            config.notify.webhook_url.as_deref(),
            Some("https://hooks.example.com/env")
        );
    }

    #[test]
    fn test_file_webhook_wins_over_env() {
        let mut base = WardenConfig::default();
        base.notify.webhook_url = Some("https://file".into());
        let config = ConfigLoader::apply_env_overrides(base, |k| {
            (k == "WARDEN_NOTIFY_WEBHOOK").then(|| "https://env".to_string())
        });
        assert_eq!(config.notify.webhook_url.as_deref(), Some("https://file"));
    }

    // ── ConfigLoader tests ─────────────────────────────────────

    #[test]
    fn test_config_loader_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("warden.toml");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(
            f,
            r#"
[models]
primary = "openai/gpt-5"
fallback_chain = ["anthropic/claude-sonnet-4"]

[spawn]
max_retries = 2
retry_delay_secs = 1
"#
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let config = loader.get();
        assert_eq!(config.models.primary, "openai/gpt-5");
        assert_eq!(config.spawn.max_retries, 2);
        assert_eq!(loader.path(), config_path.as_path());
    }

    #[test]
    fn test_config_loader_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("warden.toml");
        std::fs::write(&config_path, "[models\nprimary = ").unwrap();
        let result = ConfigLoader::load(Some(config_path.as_path()));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_loader_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::load(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(loader.get().spawn.max_retries, 3);
    }

    // ── JSON roundtrip ─────────────────────────────────────────

    #[test]
    fn test_config_json_roundtrip() {
        let config = WardenConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: WardenConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.spawn.args, config.spawn.args);
        assert_eq!(restored.notify.min_severity, AlertSeverity::Low);
    }
}
