//! # warden-core
//!
//! Shared vocabulary for the warden crates: the unified error type, health
//! and quota classifications, the error classifier, and the threshold and
//! alert tables. Everything here is pure; no I/O.

pub mod classify;
pub mod error;
pub mod thresholds;
pub mod types;

pub use classify::{ErrorType, classify};
pub use error::{Result, WardenError};
pub use thresholds::{AlertTable, LevelThresholds, Thresholds, TransitionRule};
pub use types::*;
