//! Error classification shared by the health monitor and the fallback spawner.
//!
//! Both components feed raw failure text through [`classify`], so a probe that
//! fails with "HTTP 429" and a spawn that fails with the same text are treated
//! identically.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::error::WardenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    RateLimit,
    Timeout,
    ModelUnavailable,
    Unknown,
}

impl ErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::Timeout => "timeout",
            Self::ModelUnavailable => "model_unavailable",
            Self::Unknown => "unknown",
        }
    }

    /// Classify a typed error. Typed variants map directly; anything carrying
    /// free text goes through the pattern classifier.
    pub fn of(err: &WardenError) -> Self {
        match err {
            WardenError::RateLimited(_) => Self::RateLimit,
            WardenError::Timeout(_) => Self::Timeout,
            WardenError::ModelUnavailable(_) => Self::ModelUnavailable,
            WardenError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => Self::Timeout,
            other => classify(&other.to_string()),
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static RATE_LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b429\b|rate[ _-]?limit|too many requests|quota exceeded|resource[ _]exhausted")
        .expect("valid rate limit pattern")
});

static TIMEOUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:\b|read|connect|request|gateway)timed?[ _-]?out(?:s|error|exception)?\b|deadline exceeded|connection (refused|reset|closed|aborted)|econnrefused|econnreset|etimedout|\b50[24]\b",
    )
    .expect("valid timeout pattern")
});

static UNAVAILABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)not[ _-]?found|unknown model|no such model|does not exist|\bunavailable\b|not available|\b404\b|\b503\b|overloaded",
    )
    .expect("valid unavailable pattern")
});

/// Classify a raw error message. Pure: the same input always yields the
/// same [`ErrorType`]. Rate-limit signals win over the others because a 429
/// body often also mentions "unavailable".
pub fn classify(raw: &str) -> ErrorType {
    if RATE_LIMIT.is_match(raw) {
        ErrorType::RateLimit
    } else if TIMEOUT.is_match(raw) {
        ErrorType::Timeout
    } else if UNAVAILABLE.is_match(raw) {
        ErrorType::ModelUnavailable
    } else {
        ErrorType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_codes() {
        assert_eq!(classify("HTTP 429 Too Many Requests"), ErrorType::RateLimit);
        assert_eq!(classify("HTTP 504: gateway"), ErrorType::Timeout);
        assert_eq!(classify("HTTP 404: model gpt-9 not found"), ErrorType::ModelUnavailable);
        assert_eq!(classify("HTTP 401: invalid api key"), ErrorType::Unknown);
    }

    #[test]
    fn test_status_digits_inside_numbers_do_not_match() {
        assert_eq!(classify("request id 14290 failed"), ErrorType::Unknown);
    }

    #[test]
    fn test_timeout_needs_a_whole_word() {
        assert_eq!(classify("error: runtime outdated, please upgrade"), ErrorType::Unknown);
        assert_eq!(classify("operation timed out after 30s"), ErrorType::Timeout);
        assert_eq!(classify("ReadTimeout: upstream"), ErrorType::Timeout);
        assert_eq!(classify("TimeoutError: spawn"), ErrorType::Timeout);
        assert_eq!(classify("connect ETIMEDOUT 10.0.0.1:443"), ErrorType::Timeout);
    }

    #[test]
    fn test_rate_limit_wins_over_unavailable() {
        assert_eq!(
            classify("429: capacity unavailable, rate_limit_error"),
            ErrorType::RateLimit
        );
    }

    #[test]
    fn test_typed_errors() {
        assert_eq!(
            ErrorType::of(&WardenError::RateLimited("x".into())),
            ErrorType::RateLimit
        );
        assert_eq!(
            ErrorType::of(&WardenError::Spawn("connection reset by peer".into())),
            ErrorType::Timeout
        );
        assert_eq!(
            ErrorType::of(&WardenError::Spawn("session exited with code 2".into())),
            ErrorType::Unknown
        );
    }
}
