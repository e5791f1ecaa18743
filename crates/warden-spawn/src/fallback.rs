//! Spawn with retry and fallback.
//!
//! Each call walks an ordered chain of models. A failure is classified, the
//! [`RetryPolicy`] decides whether to retry the same model or advance, and
//! exactly one [`FallbackDecision`] is logged when the call ends, whether it
//! succeeded or ran out of models.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use warden_config::WardenConfig;
use warden_core::{ErrorType, ModelId, Result, WardenError};

use crate::decision::{DecisionLog, FallbackDecision};
use crate::policy::RetryPolicy;
use crate::spawner::{CommandSpawner, SessionHandle, SessionSpawner};

/// One `spawn_with_fallback` call.
#[derive(Debug, Clone, Default)]
pub struct SpawnRequest {
    pub task: String,
    pub initial_model: ModelId,
    pub label: String,
    /// Models to try after `initial_model`. `None` uses the spawner's
    /// default chain; `Some(vec![])` means no fallback at all.
    pub fallback_chain: Option<Vec<ModelId>>,
    /// Overrides the policy's rate-limit attempt budget.
    pub max_retries: Option<u32>,
    /// Overrides the policy's delay between same-model attempts.
    pub retry_delay: Option<Duration>,
}

impl SpawnRequest {
    pub fn new(task: impl Into<String>, initial_model: impl Into<ModelId>, label: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            initial_model: initial_model.into(),
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_fallback_chain(mut self, chain: Vec<ModelId>) -> Self {
        self.fallback_chain = Some(chain);
        self
    }

    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnResult {
    pub success: bool,
    pub label: String,
    pub initial_model: ModelId,
    pub model_used: Option<ModelId>,
    pub session: Option<SessionHandle>,
    pub attempts: u32,
    /// Models actually attempted, in order.
    pub chain_tried: Vec<ModelId>,
    pub error_type: Option<ErrorType>,
    pub error: Option<String>,
}

impl SpawnResult {
    /// Whether a model other than the requested one did the work.
    pub fn fell_back(&self) -> bool {
        self.success && self.model_used.as_deref() != Some(self.initial_model.as_str())
    }

    /// The session handle, or [`WardenError::AllFailed`] with the full chain.
    pub fn into_session(self) -> Result<SessionHandle> {
        match self.session {
            Some(session) if self.success => Ok(session),
            _ => Err(WardenError::AllFailed {
                label: self.label,
                chain: self.chain_tried,
                last_error: match (self.error_type, self.error) {
                    (Some(t), Some(e)) => format!("[{t}] {e}"),
                    (_, Some(e)) => e,
                    _ => "no attempt was made".into(),
                },
            }),
        }
    }
}

/// One task in a parallel batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelTask {
    pub task: String,
    pub model: ModelId,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelResult {
    /// True when every task got a session.
    pub success: bool,
    /// Successful spawns, in call order.
    pub workers: Vec<SpawnResult>,
    /// Failed spawns, in call order.
    pub failed: Vec<SpawnResult>,
    /// Successful workers that ended up on a model other than requested.
    pub fallback_applied: usize,
}

pub struct FallbackSpawner {
    spawner: Arc<dyn SessionSpawner>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    default_chain: Vec<ModelId>,
    log: Option<DecisionLog>,
}

impl FallbackSpawner {
    pub fn new(spawner: Arc<dyn SessionSpawner>, policy: RetryPolicy) -> Self {
        Self {
            spawner,
            policy,
            attempt_timeout: Duration::from_secs(120),
            default_chain: vec![],
            log: None,
        }
    }

    pub fn with_default_chain(mut self, chain: Vec<ModelId>) -> Self {
        self.default_chain = chain;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_decision_log(mut self, log: DecisionLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Command spawner, policy, default chain and decision log from config.
    pub fn from_config(config: &WardenConfig) -> Self {
        let spawner = CommandSpawner::new(config.spawn.command.clone(), config.spawn.args.clone());
        Self::new(Arc::new(spawner), RetryPolicy::from_config(&config.spawn))
            .with_default_chain(config.models.fallback_chain.clone())
            .with_attempt_timeout(Duration::from_secs(config.spawn.attempt_timeout_secs))
            .with_decision_log(DecisionLog::new(config.state.decision_log_path()))
    }

    /// `[initial] ++ chain`, first occurrence wins.
    fn build_chain(&self, request: &SpawnRequest) -> Result<Vec<ModelId>> {
        let rest = request.fallback_chain.as_ref().unwrap_or(&self.default_chain);
        let mut chain: Vec<ModelId> = Vec::with_capacity(rest.len() + 1);
        for model in std::iter::once(&request.initial_model).chain(rest) {
            let model = model.trim();
            if model.is_empty() {
                continue;
            }
            if !chain.iter().any(|m| m == model) {
                chain.push(model.to_string());
            }
        }
        if chain.is_empty() {
            return Err(WardenError::EmptyFallbackChain);
        }
        Ok(chain)
    }

    async fn attempt(&self, task: &str, model: &str, label: &str) -> Result<SessionHandle> {
        match tokio::time::timeout(self.attempt_timeout, self.spawner.spawn(task, model, label)).await {
            Ok(result) => result,
            Err(_) => Err(WardenError::Timeout(format!(
                "spawn on {model} exceeded {}s",
                self.attempt_timeout.as_secs()
            ))),
        }
    }

    /// Try the chain in order until one model yields a session. Returns
    /// `Err` only for an unusable request; running out of models is an
    /// unsuccessful [`SpawnResult`].
    pub async fn spawn_with_fallback(&self, request: &SpawnRequest) -> Result<SpawnResult> {
        if request.task.trim().is_empty() {
            return Err(WardenError::InvalidRequest("task is empty".into()));
        }
        if request.label.trim().is_empty() {
            return Err(WardenError::InvalidRequest("label is empty".into()));
        }
        let chain = self.build_chain(request)?;
        let policy = RetryPolicy {
            max_retries: request.max_retries.unwrap_or(self.policy.max_retries),
            retry_delay: request.retry_delay.unwrap_or(self.policy.retry_delay),
            ..self.policy
        };

        let mut attempts = 0u32;
        let mut tried: Vec<ModelId> = Vec::new();
        let mut last: Option<(ErrorType, String)> = None;

        for model in &chain {
            tried.push(model.clone());
            let mut on_model = 0u32;
            loop {
                attempts += 1;
                on_model += 1;
                match self.attempt(&request.task, model, &request.label).await {
                    Ok(session) => {
                        info!(
                            label = %request.label,
                            model = %model,
                            attempts,
                            fell_back = model != &chain[0],
                            "session spawned"
                        );
                        let result = SpawnResult {
                            success: true,
                            label: request.label.clone(),
                            initial_model: chain[0].clone(),
                            model_used: Some(model.clone()),
                            session: Some(session),
                            attempts,
                            chain_tried: tried,
                            error_type: last.as_ref().map(|(t, _)| *t),
                            error: None,
                        };
                        self.record(&result);
                        return Ok(result);
                    }
                    Err(e) => {
                        let error_type = ErrorType::of(&e);
                        let budget = policy.attempts_for(error_type);
                        last = Some((error_type, e.to_string()));
                        if on_model >= budget {
                            warn!(
                                label = %request.label,
                                model = %model,
                                error_type = %error_type,
                                attempt = on_model,
                                error = %e,
                                "giving up on model, advancing"
                            );
                            break;
                        }
                        let delay = policy.delay_after(error_type, on_model);
                        warn!(
                            label = %request.label,
                            model = %model,
                            error_type = %error_type,
                            attempt = on_model,
                            max = budget,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "retrying same model"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        let (error_type, error) = match last {
            Some((t, e)) => (Some(t), Some(e)),
            None => (None, None),
        };
        warn!(
            label = %request.label,
            chain = %tried.join(" -> "),
            attempts,
            "all models failed"
        );
        let result = SpawnResult {
            success: false,
            label: request.label.clone(),
            initial_model: chain[0].clone(),
            model_used: None,
            session: None,
            attempts,
            chain_tried: tried,
            error_type,
            error,
        };
        self.record(&result);
        Ok(result)
    }

    fn record(&self, result: &SpawnResult) {
        let Some(ref log) = self.log else {
            return;
        };
        let decision = FallbackDecision {
            timestamp: Utc::now(),
            task_label: result.label.clone(),
            original_model: result.initial_model.clone(),
            model_used: result.model_used.clone(),
            error_type: result.error_type,
            attempt_number: result.attempts,
            fallback_chain: result.chain_tried.clone(),
            success: result.success,
        };
        if let Err(e) = log.append(&decision) {
            // The spawn outcome stands even if the record could not be written.
            warn!(path = %log.path().display(), error = %e, "failed to append fallback decision");
        }
    }

    /// Spawn every task independently. With `partial_substitution`, a task
    /// whose own model fails goes through the fallback chain; without it,
    /// a failing task only retries its own model. Results keep call order.
    pub async fn spawn_parallel_with_fallback(
        &self,
        tasks: &[ParallelTask],
        fallback_chain: Option<Vec<ModelId>>,
        partial_substitution: bool,
    ) -> ParallelResult {
        let chain = if partial_substitution {
            fallback_chain.unwrap_or_else(|| self.default_chain.clone())
        } else {
            vec![]
        };

        let outcomes = futures::future::join_all(tasks.iter().map(|t| {
            let request = SpawnRequest::new(t.task.clone(), t.model.clone(), t.label.clone())
                .with_fallback_chain(chain.clone());
            async move {
                match self.spawn_with_fallback(&request).await {
                    Ok(result) => result,
                    Err(e) => SpawnResult {
                        success: false,
                        label: request.label.clone(),
                        initial_model: request.initial_model.clone(),
                        model_used: None,
                        session: None,
                        attempts: 0,
                        chain_tried: vec![],
                        error_type: None,
                        error: Some(e.to_string()),
                    },
                }
            }
        }))
        .await;

        let (workers, failed): (Vec<SpawnResult>, Vec<SpawnResult>) =
            outcomes.into_iter().partition(|r| r.success);
        let fallback_applied = workers.iter().filter(|r| r.fell_back()).count();
        info!(
            spawned = workers.len(),
            failed = failed.len(),
            fallback_applied,
            "parallel spawn finished"
        );
        ParallelResult {
            success: failed.is_empty(),
            workers,
            failed,
            fallback_applied,
        }
    }
}
