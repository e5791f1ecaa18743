//! Live inference probes: one minimal completion per provider.
//!
//! This is the only ground-truth signal, and the only one that costs money,
//! so every probe asks for `max_tokens` (default 1) and runs under a short
//! timeout.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use warden_config::{ProbeKind, ProbeTarget};
use warden_core::{ProbeResult, ProviderId, Result, WardenError};

use super::{CollectorFailure, Observation, SignalCollector, SignalResult};

const PROBE_PROMPT: &str = "ping";

pub struct InferenceProbeCollector {
    client: reqwest::Client,
    targets: Vec<ProbeTarget>,
    max_tokens: u32,
    /// Reads API keys; `std::env::var` outside tests.
    key_lookup: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl InferenceProbeCollector {
    pub fn new(targets: Vec<ProbeTarget>, max_tokens: u32, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WardenError::Config(format!("probe HTTP client: {e}")))?;
        Ok(Self {
            client,
            targets,
            max_tokens: max_tokens.max(1),
            key_lookup: Box::new(|name| std::env::var(name).ok()),
        })
    }

    /// Replace the API key source.
    pub fn with_key_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.key_lookup = Box::new(lookup);
        self
    }

    async fn probe(&self, target: &ProbeTarget) -> Option<ProbeResult> {
        let api_key = match &target.api_key_env {
            Some(var) => match (self.key_lookup)(var) {
                Some(k) => Some(k),
                None => {
                    // A missing key says nothing about the provider.
                    warn!(provider = %target.provider, env = %var, "probe skipped, API key not set");
                    return None;
                }
            },
            None => None,
        };

        let base = target.base_url.trim_end_matches('/');
        let messages = serde_json::json!([{ "role": "user", "content": PROBE_PROMPT }]);
        let (endpoint, mut req) = match target.kind {
            ProbeKind::Anthropic => {
                let url = format!("{base}/messages");
                let mut req = self
                    .client
                    .post(&url)
                    .header("anthropic-version", "2023-06-01")
                    .json(&serde_json::json!({
                        "model": target.model,
                        "max_tokens": self.max_tokens,
                        "messages": messages,
                    }));
                if let Some(ref k) = api_key {
                    req = req.header("x-api-key", k);
                }
                (url, req)
            }
            ProbeKind::Openai => {
                let url = format!("{base}/chat/completions");
                let req = self.client.post(&url).json(&serde_json::json!({
                    "model": target.model,
                    "max_tokens": self.max_tokens,
                    "messages": messages,
                }));
                (url, req)
            }
        };
        if target.kind == ProbeKind::Openai
            && let Some(ref k) = api_key
        {
            req = req.bearer_auth(k);
        }

        let started = Instant::now();
        let outcome = req.send().await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(resp) => {
                let status = resp.status();
                let quota_remaining_pct = remaining_pct(resp.headers());
                if status.is_success() {
                    ProbeResult {
                        ok: true,
                        endpoint,
                        latency_ms,
                        error: None,
                        quota_remaining_pct,
                    }
                } else {
                    let body = resp.text().await.unwrap_or_default();
                    let snippet: String = body.chars().take(200).collect();
                    ProbeResult {
                        ok: false,
                        endpoint,
                        latency_ms,
                        error: Some(format!("HTTP {status}: {snippet}")),
                        quota_remaining_pct,
                    }
                }
            }
            Err(e) => {
                let error = if e.is_timeout() {
                    format!("probe timed out: {e}")
                } else {
                    e.to_string()
                };
                ProbeResult {
                    ok: false,
                    endpoint,
                    latency_ms,
                    error: Some(error),
                    quota_remaining_pct: None,
                }
            }
        };

        debug!(
            provider = %target.provider,
            ok = result.ok,
            latency_ms = result.latency_ms,
            "probe finished"
        );
        Some(result)
    }
}

#[async_trait]
impl SignalCollector for InferenceProbeCollector {
    fn name(&self) -> &str {
        "probe"
    }

    async fn collect(&self, providers: &[ProviderId]) -> SignalResult<Observation> {
        let targets: Vec<&ProbeTarget> = self
            .targets
            .iter()
            .filter(|t| providers.contains(&t.provider))
            .collect();
        if targets.is_empty() {
            return Err(CollectorFailure::Unavailable("no probe targets for configured providers".into()));
        }

        let outcomes = futures::future::join_all(targets.iter().map(|t| self.probe(t))).await;
        let mut results = HashMap::new();
        for (target, outcome) in targets.iter().zip(outcomes) {
            if let Some(result) = outcome {
                results.entry(target.provider.clone()).or_insert(result);
            }
        }
        if results.is_empty() {
            return Err(CollectorFailure::Unavailable("every probe was skipped".into()));
        }
        info!(probed = results.len(), "inference probes complete");
        Ok(Observation::Probes(results))
    }
}

/// Remaining request quota in percent from rate-limit headers, if the
/// provider sent both a limit and a remaining count.
pub fn remaining_pct(headers: &HeaderMap) -> Option<f64> {
    const PAIRS: [(&str, &str); 2] = [
        (
            "anthropic-ratelimit-requests-remaining",
            "anthropic-ratelimit-requests-limit",
        ),
        ("x-ratelimit-remaining-requests", "x-ratelimit-limit-requests"),
    ];
    let num = |name: &str| -> Option<f64> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<f64>().ok())
    };
    PAIRS.iter().find_map(|(rem, lim)| match (num(rem), num(lim)) {
        (Some(r), Some(l)) if l > 0.0 => Some((r / l * 100.0).clamp(0.0, 100.0)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_remaining_pct_anthropic_headers() {
        let mut h = HeaderMap::new();
        h.insert("anthropic-ratelimit-requests-remaining", HeaderValue::from_static("5"));
        h.insert("anthropic-ratelimit-requests-limit", HeaderValue::from_static("50"));
        assert_eq!(remaining_pct(&h), Some(10.0));
    }

    #[test]
    fn test_remaining_pct_openai_headers() {
        let mut h = HeaderMap::new();
        h.insert("x-ratelimit-remaining-requests", HeaderValue::from_static("900"));
        h.insert("x-ratelimit-limit-requests", HeaderValue::from_static("1000"));
        assert_eq!(remaining_pct(&h), Some(90.0));
    }

    #[test]
    fn test_remaining_pct_needs_both_headers() {
        let mut h = HeaderMap::new();
        h.insert("x-ratelimit-remaining-requests", HeaderValue::from_static("900"));
        assert_eq!(remaining_pct(&h), None);
    }

    #[tokio::test]
    async fn test_no_matching_targets_is_unavailable() {
        let collector = InferenceProbeCollector::new(vec![], 1, Duration::from_secs(1)).unwrap();
        let result = collector.collect(&["openai".to_string()]).await;
        assert!(matches!(result, Err(CollectorFailure::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_missing_key_skips_inference_check() {
        let target = ProbeTarget {
            provider: "openai".into(),
            kind: ProbeKind::Openai,
            base_url: "http://127.0.0.1:9".into(),
            model: "gpt-5".into(),
            api_key_env: Some("WARDEN_TEST_UNSET_KEY".into()),
        };
        let collector = InferenceProbeCollector::new(vec![target], 1, Duration::from_secs(1))
            .unwrap()
            .with_key_lookup(|_| None);
        let result = collector.collect(&["openai".to_string()]).await;
        assert!(matches!(result, Err(CollectorFailure::Unavailable(_))));
    }
}
