//! Presentation events.
//!
//! Everything the presentation layer sees of a run arrives as a [`RunEvent`]
//! through an [`EventSink`]. Every event carries the run identity, so a
//! consumer can drop anything that belongs to a run it no longer shows.

mod sink;

pub use sink::{
    ChannelEventSink, CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{RunStatus, Stage, StageResult};
use crate::errors::ErrorKind;
use crate::progress::ProgressSnapshot;

/// An observable run transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// Fresh progress snapshot, emitted after every transition.
    Progress(ProgressSnapshot),
    /// A stage result was stored. Emitted in stage order.
    StageCompleted {
        /// Run identity.
        run_id: Uuid,
        /// The stored result.
        result: StageResult,
    },
    /// A stage failed.
    StageFailed {
        /// Run identity.
        run_id: Uuid,
        /// The failing stage.
        stage: Stage,
        /// Error classification.
        kind: ErrorKind,
        /// Error message.
        error: String,
    },
    /// The gate was asked about an optional stage.
    DecisionRequested {
        /// Run identity.
        run_id: Uuid,
        /// The optional stage on offer.
        stage: Stage,
    },
    /// The run reached a terminal status.
    RunFinished {
        /// Run identity.
        run_id: Uuid,
        /// Terminal status.
        status: RunStatus,
        /// Error message for failed runs.
        error: Option<String>,
    },
}

impl RunEvent {
    /// Returns the run this event belongs to.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        match self {
            Self::Progress(snapshot) => snapshot.run_id,
            Self::StageCompleted { run_id, .. }
            | Self::StageFailed { run_id, .. }
            | Self::DecisionRequested { run_id, .. }
            | Self::RunFinished { run_id, .. } => *run_id,
        }
    }

    /// Dotted event type name used in logs.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Progress(_) => "run.progress",
            Self::StageCompleted { .. } => "stage.completed",
            Self::StageFailed { .. } => "stage.failed",
            Self::DecisionRequested { .. } => "gate.decision_requested",
            Self::RunFinished { .. } => "run.finished",
        }
    }

    /// Converts to a JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
