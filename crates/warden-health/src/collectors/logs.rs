//! Heuristic error counting over the tail of gateway logs.
//!
//! Counts are approximate by construction, so anything derived from them is
//! tagged `quotaSource: estimated`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use warden_core::{ErrorCategory, ErrorCounts, ProviderId};

use super::{CollectorFailure, LogCounts, Observation, SignalCollector, SignalResult};

pub struct LogPatternCollector {
    files: Vec<PathBuf>,
    window: Duration,
    tail_bytes: u64,
    patterns: Vec<(ErrorCategory, Vec<String>)>,
}

impl LogPatternCollector {
    pub fn new(
        files: Vec<PathBuf>,
        window: Duration,
        tail_bytes: u64,
        patterns: Vec<(ErrorCategory, Vec<String>)>,
    ) -> Self {
        Self {
            files,
            window,
            tail_bytes,
            patterns,
        }
    }

    async fn read_tail(&self, path: &Path) -> std::io::Result<String> {
        let mut file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        let start = len.saturating_sub(self.tail_bytes);
        file.seek(SeekFrom::Start(start)).await?;
        let mut buf = Vec::with_capacity((len - start) as usize);
        file.read_to_end(&mut buf).await?;
        let text = String::from_utf8_lossy(&buf).into_owned();
        if start > 0 {
            // First line is probably cut in half.
            return Ok(text.split_once('\n').map(|(_, rest)| rest.to_string()).unwrap_or_default());
        }
        Ok(text)
    }
}

#[async_trait]
impl SignalCollector for LogPatternCollector {
    fn name(&self) -> &str {
        "logs"
    }

    async fn collect(&self, providers: &[ProviderId]) -> SignalResult<Observation> {
        if self.files.is_empty() {
            return Err(CollectorFailure::Unavailable("no log files configured".into()));
        }

        let now = Utc::now();
        let mut counts = LogCounts::default();
        let mut read_any = false;
        let mut last_err = None;

        for path in &self.files {
            match self.read_tail(path).await {
                Ok(text) => {
                    read_any = true;
                    scan(&text, providers, &self.patterns, now - self.window, &mut counts);
                }
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "log file unreadable");
                    last_err = Some(format!("{}: {}", path.display(), e));
                }
            }
        }

        if !read_any {
            return Err(CollectorFailure::Unavailable(
                last_err.unwrap_or_else(|| "no readable log files".into()),
            ));
        }
        Ok(Observation::ErrorCounts(counts))
    }
}

/// Count pattern matches in `text`, skipping lines stamped before `since`.
/// A line counts at most once per category.
pub fn scan(
    text: &str,
    providers: &[ProviderId],
    patterns: &[(ErrorCategory, Vec<String>)],
    since: DateTime<Utc>,
    counts: &mut LogCounts,
) {
    let lowered: Vec<String> = providers.iter().map(|p| p.to_lowercase()).collect();

    for line in text.lines() {
        if line_timestamp(line).is_some_and(|ts| ts < since) {
            continue;
        }
        let hits: Vec<ErrorCategory> = patterns
            .iter()
            .filter(|(_, needles)| needles.iter().any(|n| !n.is_empty() && line.contains(n.as_str())))
            .map(|(category, _)| *category)
            .collect();
        if hits.is_empty() {
            continue;
        }

        let line_lower = line.to_lowercase();
        for category in &hits {
            bump(&mut counts.total, *category);
        }
        for (provider, lower) in providers.iter().zip(&lowered) {
            if line_lower.contains(lower.as_str()) {
                let entry = counts.per_provider.entry(provider.clone()).or_default();
                for category in &hits {
                    bump(entry, *category);
                }
            }
        }
    }
}

fn bump(counts: &mut ErrorCounts, category: ErrorCategory) {
    *counts.entry(category).or_insert(0) += 1;
}

/// RFC 3339 timestamp at the start of a line, optionally in brackets.
fn line_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let first = line.split_whitespace().next()?;
    let first = first.trim_start_matches('[').trim_end_matches(']');
    DateTime::parse_from_rfc3339(first)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Vec<(ErrorCategory, Vec<String>)> {
        vec![
            (ErrorCategory::RateLimit, vec!["rate_limit".into()]),
            (ErrorCategory::FailoverError, vec!["FailoverError".into()]),
            (ErrorCategory::Unavailable, vec!["all models in cooldown".into()]),
        ]
    }

    fn providers() -> Vec<ProviderId> {
        vec!["anthropic".into(), "openai".into()]
    }

    #[test]
    fn test_counts_and_attribution() {
        let now = Utc::now();
        let text = format!(
            "{ts} ERROR provider=openai rate_limit_error: slow down\n\
             {ts} ERROR FailoverError: Anthropic overloaded\n\
             {ts} WARN all models in cooldown\n\
             {ts} INFO request ok provider=openai\n",
            ts = now.to_rfc3339()
        );
        let mut counts = LogCounts::default();
        scan(&text, &providers(), &patterns(), now - Duration::minutes(5), &mut counts);

        assert_eq!(counts.total[&ErrorCategory::RateLimit], 1);
        assert_eq!(counts.total[&ErrorCategory::FailoverError], 1);
        assert_eq!(counts.total[&ErrorCategory::Unavailable], 1);
        assert_eq!(counts.per_provider["openai"][&ErrorCategory::RateLimit], 1);
        assert_eq!(counts.per_provider["anthropic"][&ErrorCategory::FailoverError], 1);
        assert!(!counts.per_provider["openai"].contains_key(&ErrorCategory::FailoverError));
    }

    #[test]
    fn test_old_lines_are_outside_window() {
        let now = Utc::now();
        let old = (now - Duration::hours(1)).to_rfc3339();
        let text = format!("[{old}] rate_limit hit\nrate_limit hit without timestamp\n");
        let mut counts = LogCounts::default();
        scan(&text, &providers(), &patterns(), now - Duration::minutes(5), &mut counts);
        assert_eq!(counts.total[&ErrorCategory::RateLimit], 1);
    }

    #[test]
    fn test_line_timestamp_forms() {
        assert!(line_timestamp("2026-10-19T08:00:00Z INFO x").is_some());
        assert!(line_timestamp("[2026-10-19T08:00:00+02:00] x").is_some());
        assert!(line_timestamp("Oct 19 08:00:00 host x").is_none());
    }

    #[tokio::test]
    async fn test_reads_only_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.log");
        let mut body = String::new();
        for _ in 0..200 {
            body.push_str("rate_limit old noise line padding padding\n");
        }
        body.push_str("FailoverError at the end\n");
        std::fs::write(&path, &body).unwrap();

        let collector = LogPatternCollector::new(vec![path], Duration::minutes(5), 64, patterns());
        let Observation::ErrorCounts(counts) = collector.collect(&providers()).await.unwrap() else {
            panic!("expected error counts");
        };
        assert_eq!(counts.total.get(&ErrorCategory::FailoverError), Some(&1));
        assert!(counts.total.get(&ErrorCategory::RateLimit).copied().unwrap_or(0) <= 1);
    }

    #[tokio::test]
    async fn test_all_files_missing_is_unavailable() {
        let collector = LogPatternCollector::new(
            vec!["/nonexistent/gateway.log".into()],
            Duration::minutes(5),
            1024,
            patterns(),
        );
        assert!(matches!(
            collector.collect(&providers()).await,
            Err(CollectorFailure::Unavailable(_))
        ));
    }
}
