//! # warden-spawn
//!
//! Spawn-with-fallback for agent sessions. Failures are classified with the
//! same classifier the health monitor uses, retried per error type, and on
//! exhaustion the next model in the chain is tried. Every call leaves one
//! record in the decision log.

pub mod decision;
pub mod fallback;
pub mod mock;
pub mod policy;
pub mod spawner;

pub use decision::{DecisionLog, FallbackDecision};
pub use fallback::{FallbackSpawner, ParallelResult, ParallelTask, SpawnRequest, SpawnResult};
pub use mock::MockSpawner;
pub use policy::RetryPolicy;
pub use spawner::{CommandSpawner, SessionHandle, SessionSpawner};
