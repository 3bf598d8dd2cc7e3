//! Run state management.
//!
//! This module provides:
//! - `RunIdentity` for tagging everything a run produces
//! - `AnalysisRun`, the aggregate that owns the stage sequence and results

mod identity;
mod run;

pub use identity::RunIdentity;
pub use run::AnalysisRun;
