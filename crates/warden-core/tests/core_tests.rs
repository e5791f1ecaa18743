#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use warden_core::*;

    // ── Classifier ─────────────────────────────────────────────

    #[test]
    fn test_classify_is_idempotent() {
        let inputs = [
            "HTTP 429: rate_limit_error",
            "request timed out after 30s",
            "model claude-opus-9 not found",
            "segfault",
            "",
        ];
        for input in inputs {
            let first = classify(input);
            for _ in 0..10 {
                assert_eq!(classify(input), first, "input: {input:?}");
            }
        }
    }

    #[test]
    fn test_classify_categories() {
        assert_eq!(classify("Too Many Requests"), ErrorType::RateLimit);
        assert_eq!(classify("connection refused"), ErrorType::Timeout);
        assert_eq!(classify("deadline exceeded"), ErrorType::Timeout);
        assert_eq!(classify("The model `gpt-9` does not exist"), ErrorType::ModelUnavailable);
        assert_eq!(classify("provider overloaded"), ErrorType::ModelUnavailable);
        assert_eq!(classify("invalid json in tool args"), ErrorType::Unknown);
    }

    #[test]
    fn test_error_type_serde_names() {
        assert_eq!(serde_json::to_string(&ErrorType::RateLimit).unwrap(), "\"rate_limit\"");
        assert_eq!(
            serde_json::to_string(&ErrorType::ModelUnavailable).unwrap(),
            "\"model_unavailable\""
        );
        assert_eq!(ErrorType::Timeout.to_string(), "timeout");
    }

    // ── Errors ─────────────────────────────────────────────────

    #[test]
    fn test_all_failed_display_lists_chain() {
        let err = WardenError::AllFailed {
            label: "digest".into(),
            chain: vec!["openai/gpt-5".into(), "anthropic/claude-sonnet-4".into()],
            last_error: "HTTP 429".into(),
        };
        let s = err.to_string();
        assert!(s.contains("digest"));
        assert!(s.contains("openai/gpt-5 -> anthropic/claude-sonnet-4"));
        assert!(s.contains("HTTP 429"));
    }

    #[test]
    fn test_io_timeout_classifies_as_timeout() {
        let err = WardenError::from(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
        assert_eq!(ErrorType::of(&err), ErrorType::Timeout);
    }

    // ── Types ──────────────────────────────────────────────────

    #[test]
    fn test_provider_of() {
        assert_eq!(provider_of("openai/gpt-5"), "openai");
        assert_eq!(provider_of("ollama/llama3/8b"), "ollama");
        assert_eq!(provider_of("local"), "local");
    }

    #[test]
    fn test_signal_cooldown_window() {
        let now = Utc::now();
        let mut signal = ProviderSignal::new("openai");
        assert!(!signal.is_cooling_down(now));
        signal.cooldown_until = Some(now + Duration::seconds(30));
        assert!(signal.is_cooling_down(now));
        signal.cooldown_until = Some(now - Duration::seconds(1));
        assert!(!signal.is_cooling_down(now));
    }

    #[test]
    fn test_signal_error_count_defaults_to_zero() {
        let mut signal = ProviderSignal::new("gemini");
        assert_eq!(signal.error_count(ErrorCategory::RateLimit), 0);
        let mut counts = ErrorCounts::new();
        counts.insert(ErrorCategory::RateLimit, 2);
        signal.recent_error_counts = Some(counts);
        assert_eq!(signal.error_count(ErrorCategory::RateLimit), 2);
        assert_eq!(signal.error_count(ErrorCategory::Unavailable), 0);
    }

    #[test]
    fn test_health_state_ordering_of_risk() {
        assert!(QuotaRisk::Low < QuotaRisk::Medium);
        assert!(QuotaRisk::High < QuotaRisk::Critical);
        assert!(AlertSeverity::Low < AlertSeverity::High);
        assert_eq!(HealthState::Degraded.to_string(), "degraded");
    }

    // ── Threshold config ───────────────────────────────────────

    #[test]
    fn test_alert_table_from_json_rows() {
        let json = r#"{"transitions": [
            {"from": "healthy", "to": "critical", "severity": "high"}
        ]}"#;
        let table: AlertTable = serde_json::from_str(json).unwrap();
        assert_eq!(
            table.severity(HealthState::Healthy, HealthState::Critical),
            Some(AlertSeverity::High)
        );
        assert_eq!(table.missing().len(), 5);
    }
}
