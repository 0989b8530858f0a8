//! Decision and state-machine logic of the navlink pipeline: telemetry fusion,
//! heartbeat liveness, command decisions, and the worker loops driving them.

pub mod command;
pub mod doctor;
pub mod error;
pub mod heartbeat;
pub mod telemetry;
pub mod worker;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{ConfigError, EngineError, FuseError};
