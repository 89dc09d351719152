//! Animus core
//!
//! A cognitive orchestration kernel: a pure state reducer for an embodied
//! conversational agent, a guard pipeline that validates every model
//! output before it is spoken, a small memory cache layer and the async
//! runtime loop that ties them to the outside world.

pub mod config;
pub mod error;
pub mod guard;
pub mod kernel;
pub mod logger;
pub mod memory;
pub mod runtime;

#[cfg(test)]
mod integration_tests;

// Re-exports for convenience
pub use config::AnimusConfig;
pub use error::{ConfigError, GuardError, InferenceError, RuntimeError};
pub use kernel::{KernelEngine, KernelEvent, KernelOutput, KernelState};
pub use runtime::{RuntimeLoop, TurnOutcome};
