//! Append-only JSONL log of fallback decisions.
//!
//! One line per terminal outcome of a spawn call. Lines are written with a
//! single `write` on a file opened in append mode, so concurrent writers
//! never interleave within a record. Nothing here rewrites or truncates the
//! file; rotation belongs to whoever owns the directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

use warden_core::{ErrorType, ModelId, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackDecision {
    pub timestamp: DateTime<Utc>,
    pub task_label: String,
    pub original_model: ModelId,
    /// `None` when every model failed.
    pub model_used: Option<ModelId>,
    /// Classification of the last failure; `None` if the first attempt
    /// succeeded.
    pub error_type: Option<ErrorType>,
    /// Total attempts across the whole chain.
    pub attempt_number: u32,
    /// Models actually tried, in order.
    pub fallback_chain: Vec<ModelId>,
    pub success: bool,
}

#[derive(Debug, Clone)]
pub struct DecisionLog {
    path: PathBuf,
}

impl DecisionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, decision: &FallbackDecision) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let mut line = serde_json::to_vec(decision)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        Ok(())
    }

    /// Every readable record, oldest first. Malformed lines are skipped.
    pub fn read_all(&self) -> Result<Vec<FallbackDecision>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for (i, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(d) => out.push(d),
                Err(e) => warn!(line = i + 1, error = %e, "skipping malformed decision record"),
            }
        }
        Ok(out)
    }

    /// The last `n` records, oldest first.
    pub fn tail(&self, n: usize) -> Result<Vec<FallbackDecision>> {
        let mut all = self.read_all()?;
        let skip = all.len().saturating_sub(n);
        Ok(all.split_off(skip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(label: &str) -> FallbackDecision {
        FallbackDecision {
            timestamp: Utc::now(),
            task_label: label.into(),
            original_model: "openai/gpt-5".into(),
            model_used: Some("gemini/gemini-2.5-pro".into()),
            error_type: Some(ErrorType::RateLimit),
            attempt_number: 4,
            fallback_chain: vec!["openai/gpt-5".into(), "gemini/gemini-2.5-pro".into()],
            success: true,
        }
    }

    #[test]
    fn test_record_field_names() {
        let v = serde_json::to_value(decision("a")).unwrap();
        for key in [
            "timestamp",
            "taskLabel",
            "originalModel",
            "modelUsed",
            "errorType",
            "attemptNumber",
            "fallbackChain",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
        assert_eq!(v["errorType"], "rate_limit");
    }

    #[test]
    fn test_tail_and_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = DecisionLog::new(dir.path().join("nested/decisions.jsonl"));
        for label in ["a", "b", "c"] {
            log.append(&decision(label)).unwrap();
        }
        let mut f = OpenOptions::new().append(true).open(log.path()).unwrap();
        f.write_all(b"garbage\n").unwrap();
        log.append(&decision("d")).unwrap();

        let tail: Vec<String> = log.tail(2).unwrap().into_iter().map(|d| d.task_label).collect();
        assert_eq!(tail, vec!["c", "d"]);
        assert_eq!(log.read_all().unwrap().len(), 4);
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let log = DecisionLog::new("/nonexistent/warden/decisions.jsonl");
        assert!(log.read_all().unwrap().is_empty());
    }
}
