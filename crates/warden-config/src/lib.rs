//! # warden-config
//!
//! Configuration for warden. Reads `warden.toml`, then applies environment
//! overrides. Every section has defaults, so an absent file is valid.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::WardenConfig;
pub use schema::{ConfigWarning, ProbeKind, ProbeTarget, SinkKind, WarningSeverity};
