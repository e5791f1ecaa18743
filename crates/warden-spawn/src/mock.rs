//! Mock session spawner for deterministic testing.
//!
//! Outcomes are scripted per model and consumed in order; a model with
//! nothing left in its script uses its standing outcome (success unless set).

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use warden_core::{ModelId, Result, WardenError};

use crate::spawner::{SessionHandle, SessionSpawner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    Success,
    /// Fail with this text; it goes through the classifier like a real error.
    Fail(String),
    /// Never return; only a per-attempt timeout ends it.
    Hang,
}

/// One recorded call to [`MockSpawner::spawn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockAttempt {
    pub model: ModelId,
    pub label: String,
    pub task: String,
}

#[derive(Default)]
pub struct MockSpawner {
    scripts: Mutex<HashMap<ModelId, VecDeque<MockOutcome>>>,
    standing: Mutex<HashMap<ModelId, MockOutcome>>,
    attempts: Mutex<Vec<MockAttempt>>,
    next_id: AtomicU64,
}

impl MockSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one outcome for `model`.
    pub fn with_outcome(self, model: &str, outcome: MockOutcome) -> Self {
        self.scripts
            .lock()
            .entry(model.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    /// Queue `n` failures with the same text.
    pub fn with_failures(self, model: &str, error: &str, n: usize) -> Self {
        (0..n).fold(self, |s, _| s.with_outcome(model, MockOutcome::Fail(error.to_string())))
    }

    /// Outcome for `model` once its script is used up.
    pub fn always(self, model: &str, outcome: MockOutcome) -> Self {
        self.standing.lock().insert(model.to_string(), outcome);
        self
    }

    pub fn attempts(&self) -> Vec<MockAttempt> {
        self.attempts.lock().clone()
    }

    /// Models in the order they were attempted.
    pub fn models_tried(&self) -> Vec<ModelId> {
        self.attempts.lock().iter().map(|a| a.model.clone()).collect()
    }

    fn next_outcome(&self, model: &str) -> MockOutcome {
        if let Some(outcome) = self.scripts.lock().get_mut(model).and_then(|q| q.pop_front()) {
            return outcome;
        }
        self.standing
            .lock()
            .get(model)
            .cloned()
            .unwrap_or(MockOutcome::Success)
    }
}

#[async_trait]
impl SessionSpawner for MockSpawner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn spawn(&self, task: &str, model: &str, label: &str) -> Result<SessionHandle> {
        self.attempts.lock().push(MockAttempt {
            model: model.to_string(),
            label: label.to_string(),
            task: task.to_string(),
        });
        match self.next_outcome(model) {
            MockOutcome::Success => {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                Ok(SessionHandle {
                    session_id: format!("mock-{n}"),
                    model: model.to_string(),
                    label: label.to_string(),
                })
            }
            MockOutcome::Fail(error) => Err(WardenError::Spawn(error)),
            MockOutcome::Hang => {
                tokio::time::sleep(Duration::from_secs(365 * 24 * 3600)).await;
                Err(WardenError::Spawn("mock hang ended".into()))
            }
        }
    }
}
