//! # Analysisflow
//!
//! Step orchestration for multi-stage business analysis runs.
//!
//! A run takes one free-text business context and walks it through a fixed
//! sequence of analysis stages on a remote backend:
//!
//! - **Required stages**: strategy, competitors, revenue, cost and ROI, in
//!   that order; any failure fails the run
//! - **Optional stages**: justification and deck, each offered once through
//!   an [`gate::OptionalStageGate`] after the required stages complete
//! - **Dual response shapes**: a stage either returns its raw result for
//!   formatting or acknowledges and is polled until its formatted result is
//!   ready
//! - **One-stage lookahead**: the next stage's process call may overlap the
//!   current stage's formatting, while results stay in stage order
//! - **Progress events**: immutable snapshots after every transition, tagged
//!   with the run identity
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use analysisflow::prelude::*;
//! use std::sync::Arc;
//!
//! let gate = Arc::new(ChannelGate::new());
//! let orchestrator = Arc::new(
//!     StepOrchestrator::from_config(OrchestratorConfig::from_env()?, gate.clone())?
//!         .with_event_sink(Arc::new(LoggingEventSink::default())),
//! );
//!
//! let handle = orchestrator.start("a coffee subscription service")?;
//! let report = handle.join().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod client;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod gate;
pub mod observability;
pub mod orchestrator;
pub mod polling;
pub mod progress;
pub mod store;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::client::{HttpStageClient, PollResponse, ProcessResponse, RemoteStageClient};
    pub use crate::config::{BackendConfig, OrchestratorConfig, PayloadMode, PollConfig};
    pub use crate::context::{AnalysisRun, RunIdentity};
    pub use crate::core::{
        FormattedResult, RunStatus, Section, Stage, StageKind, StageResult, StageStatus,
        OPTIONAL_STAGES, REQUIRED_STAGES,
    };
    pub use crate::errors::{AnalysisError, ErrorKind, Result};
    pub use crate::events::{
        ChannelEventSink, CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink,
        RunEvent,
    };
    pub use crate::gate::{ChannelGate, DecisionRequest, OptionalStageGate};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::orchestrator::{RunHandle, RunReport, StepOrchestrator};
    pub use crate::polling::PollingCompletionWatcher;
    pub use crate::progress::{ProgressProjector, ProgressSnapshot, StageProgress};
    pub use crate::store::ResultStore;
}
