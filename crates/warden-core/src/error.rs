use thiserror::Error;

/// Unified error type for every warden crate.
#[derive(Error, Debug)]
pub enum WardenError {
    // ── Spawn errors ───────────────────────────────────────────
    #[error("spawn failed: {0}")]
    Spawn(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("all models failed for '{label}' (tried: {}), last error: {last_error}", chain.join(" -> "))]
    AllFailed {
        label: String,
        chain: Vec<String>,
        last_error: String,
    },

    #[error("fallback chain is empty")]
    EmptyFallbackChain,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // ── Monitor errors ─────────────────────────────────────────
    #[error("state store error: {0}")]
    StateStore(String),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("notification failed: {0}")]
    Notify(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WardenError>;
