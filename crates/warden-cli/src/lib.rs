//! # warden-cli
//!
//! Command-line interface for the warden model health monitor.
//!
//! ## Commands
//!
//! - `warden tick`: Run one health monitoring pass (exit 0 whatever the health)
//! - `warden spawn`: Spawn one session, falling back across models
//! - `warden batch`: Spawn a JSON list of tasks in parallel
//! - `warden status`: Show the persisted health snapshot
//! - `warden decisions`: Tail the fallback decision log
//! - `warden config`: Show the effective configuration

pub mod commands;

pub use commands::Cli;
