//! Reads provider cooldowns from the gateway's auth-profile / usage store.
//!
//! The store is a JSON object keyed `provider` or `provider:profile`,
//! optionally nested under `usageStats`, each entry carrying `cooldownUntil`
//! in epoch milliseconds:
//!
//! ```json
//! { "usageStats": { "openai:default": { "cooldownUntil": 1760000000000 } } }
//! ```
//!
//! A provider with several profiles is cooling down only while every profile
//! is; its expiry is the earliest one.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::path::PathBuf;

use warden_core::ProviderId;

use super::{CollectorFailure, CooldownMap, Observation, SignalCollector, SignalResult};

pub struct CooldownCollector {
    path: PathBuf,
}

impl CooldownCollector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SignalCollector for CooldownCollector {
    fn name(&self) -> &str {
        "cooldown"
    }

    async fn collect(&self, providers: &[ProviderId]) -> SignalResult<Observation> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| CollectorFailure::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        let map = parse_store(&raw, providers, Utc::now())?;
        Ok(Observation::Cooldowns(map))
    }
}

/// Parse the store into a cooldown per requested provider. Providers absent
/// from the store are reported as not cooling down.
pub fn parse_store(
    raw: &str,
    providers: &[ProviderId],
    now: DateTime<Utc>,
) -> SignalResult<CooldownMap> {
    let doc: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| CollectorFailure::ParseError(e.to_string()))?;
    let entries = doc
        .get("usageStats")
        .unwrap_or(&doc)
        .as_object()
        .ok_or_else(|| CollectorFailure::ParseError("expected a JSON object".into()))?;

    // provider -> (profiles seen, earliest active expiry, profiles cooling)
    let mut seen: HashMap<&str, (usize, Option<DateTime<Utc>>, usize)> = HashMap::new();
    for (key, entry) in entries {
        let provider = key.split_once(':').map(|(p, _)| p).unwrap_or(key.as_str());
        let slot = seen.entry(provider).or_insert((0, None, 0));
        slot.0 += 1;

        let until = entry
            .get("cooldownUntil")
            .and_then(|v| v.as_i64())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .filter(|t| *t > now);
        if let Some(t) = until {
            slot.2 += 1;
            slot.1 = Some(slot.1.map_or(t, |cur| cur.min(t)));
        }
    }

    Ok(providers
        .iter()
        .map(|p| {
            let until = match seen.get(p.as_str()) {
                Some((profiles, earliest, cooling)) if cooling == profiles => *earliest,
                _ => None,
            };
            (p.clone(), until)
        })
        .collect())
}

/// Whole seconds until `until`, zero if already past.
pub fn remaining_secs(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (until - now).num_seconds().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ids(list: &[&str]) -> Vec<ProviderId> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_nested_usage_stats() {
        let now = Utc::now();
        let until = (now + Duration::minutes(10)).timestamp_millis();
        let raw = format!(r#"{{"usageStats": {{"openai:default": {{"cooldownUntil": {until}}}}}}}"#);
        let map = parse_store(&raw, &ids(&["openai", "anthropic"]), now).unwrap();
        assert!(map["openai"].is_some());
        assert_eq!(map["anthropic"], None);
    }

    #[test]
    fn test_expired_cooldown_is_ignored() {
        let now = Utc::now();
        let past = (now - Duration::minutes(1)).timestamp_millis();
        let raw = format!(r#"{{"gemini": {{"cooldownUntil": {past}}}}}"#);
        let map = parse_store(&raw, &ids(&["gemini"]), now).unwrap();
        assert_eq!(map["gemini"], None);
    }

    #[test]
    fn test_one_usable_profile_keeps_provider_usable() {
        let now = Utc::now();
        let until = (now + Duration::minutes(10)).timestamp_millis();
        let raw = format!(
            r#"{{"anthropic:work": {{"cooldownUntil": {until}}}, "anthropic:personal": {{"cooldownUntil": null}}}}"#
        );
        let map = parse_store(&raw, &ids(&["anthropic"]), now).unwrap();
        assert_eq!(map["anthropic"], None);
    }

    #[test]
    fn test_all_profiles_cooling_reports_earliest() {
        let now = Utc::now();
        let soon = now + Duration::minutes(2);
        let later = now + Duration::minutes(20);
        let raw = format!(
            r#"{{"anthropic:a": {{"cooldownUntil": {}}}, "anthropic:b": {{"cooldownUntil": {}}}}}"#,
            later.timestamp_millis(),
            soon.timestamp_millis()
        );
        let map = parse_store(&raw, &ids(&["anthropic"]), now).unwrap();
        assert_eq!(
            map["anthropic"].unwrap().timestamp_millis(),
            soon.timestamp_millis()
        );
        let left = remaining_secs(map["anthropic"].unwrap(), now);
        assert!((119..=120).contains(&left));
        assert_eq!(remaining_secs(now - Duration::minutes(1), now), 0);
    }

    #[test]
    fn test_malformed_store() {
        let now = Utc::now();
        assert!(matches!(
            parse_store("not json", &ids(&["openai"]), now),
            Err(CollectorFailure::ParseError(_))
        ));
        assert!(matches!(
            parse_store("[1, 2]", &ids(&["openai"]), now),
            Err(CollectorFailure::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_store_is_unavailable() {
        let collector = CooldownCollector::new("/nonexistent/warden/auth-profiles.json");
        let result = collector.collect(&ids(&["openai"])).await;
        assert!(matches!(result, Err(CollectorFailure::Unavailable(_))));
    }
}
