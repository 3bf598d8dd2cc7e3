//! Testing utilities.
//!
//! Scripted stand-ins for the backend and the user, for exercising the
//! orchestrator without a network.

mod mocks;

pub use mocks::{sample_formatted, ClientCall, ScriptedGate, ScriptedStageClient, StageScript};
