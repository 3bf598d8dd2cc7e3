//! Error types for the analysis pipeline.
//!
//! Every fallible operation in the crate returns [`AnalysisError`]. The
//! variants map one-to-one onto the failure classes a presentation layer
//! needs to tell apart: bad input, transport failures, backend-reported
//! failures, and polling exhaustion.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::core::Stage;

/// The main error type for analysis operations.
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    /// The submitted context was empty or whitespace-only.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Why the input was rejected.
        message: String,
    },

    /// A transport-level failure on any backend call.
    #[error("Network error{}: {message}", stage_suffix(*stage))]
    Network {
        /// The stage whose call failed, if the call was stage-scoped.
        stage: Option<Stage>,
        /// The underlying transport error message.
        message: String,
    },

    /// The backend reported that formatting a stage result failed.
    #[error("Formatting failed for stage '{stage}': {message}")]
    Formatting {
        /// The stage being formatted.
        stage: Stage,
        /// The reason reported by the backend.
        message: String,
    },

    /// The backend reported an explicit error for a stage.
    #[error("Stage '{stage}' failed: {message}")]
    StageProcessing {
        /// The failing stage.
        stage: Stage,
        /// The error reported by the backend.
        message: String,
    },

    /// Bounded polling was exhausted before the stage completed.
    #[error("Polling for stage '{stage}' timed out after {attempts} attempts")]
    PollTimeout {
        /// The stage being polled.
        stage: Stage,
        /// The number of attempts made.
        attempts: u32,
    },

    /// The run was abandoned before the operation finished.
    #[error("Run cancelled: {reason}")]
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },

    /// A result was written twice for the same stage.
    #[error("Result conflict: stage '{stage}' already has a stored result")]
    ResultConflict {
        /// The stage with an existing result.
        stage: Stage,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn stage_suffix(stage: Option<Stage>) -> String {
    stage.map_or_else(String::new, |s| format!(" in stage '{s}'"))
}

/// Stable, serializable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`AnalysisError::InvalidInput`].
    InvalidInput,
    /// See [`AnalysisError::Network`].
    Network,
    /// See [`AnalysisError::Formatting`].
    Formatting,
    /// See [`AnalysisError::StageProcessing`].
    StageProcessing,
    /// See [`AnalysisError::PollTimeout`].
    PollTimeout,
    /// See [`AnalysisError::Cancelled`].
    Cancelled,
    /// See [`AnalysisError::ResultConflict`].
    ResultConflict,
    /// See [`AnalysisError::Config`].
    Config,
    /// See [`AnalysisError::Serialization`].
    Serialization,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidInput => "invalid_input",
            Self::Network => "network",
            Self::Formatting => "formatting",
            Self::StageProcessing => "stage_processing",
            Self::PollTimeout => "poll_timeout",
            Self::Cancelled => "cancelled",
            Self::ResultConflict => "result_conflict",
            Self::Config => "config",
            Self::Serialization => "serialization",
        };
        f.write_str(s)
    }
}

impl AnalysisError {
    /// Creates an invalid input error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a network error that is not tied to a stage.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            stage: None,
            message: message.into(),
        }
    }

    /// Creates a network error for a stage-scoped call.
    #[must_use]
    pub fn network_in(stage: Stage, message: impl Into<String>) -> Self {
        Self::Network {
            stage: Some(stage),
            message: message.into(),
        }
    }

    /// Creates a formatting error.
    #[must_use]
    pub fn formatting(stage: Stage, message: impl Into<String>) -> Self {
        Self::Formatting {
            stage,
            message: message.into(),
        }
    }

    /// Creates a stage processing error.
    #[must_use]
    pub fn stage_processing(stage: Stage, message: impl Into<String>) -> Self {
        Self::StageProcessing {
            stage,
            message: message.into(),
        }
    }

    /// Creates a poll timeout error.
    #[must_use]
    pub const fn poll_timeout(stage: Stage, attempts: u32) -> Self {
        Self::PollTimeout { stage, attempts }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::Network { .. } => ErrorKind::Network,
            Self::Formatting { .. } => ErrorKind::Formatting,
            Self::StageProcessing { .. } => ErrorKind::StageProcessing,
            Self::PollTimeout { .. } => ErrorKind::PollTimeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::ResultConflict { .. } => ErrorKind::ResultConflict,
            Self::Config(_) => ErrorKind::Config,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Returns the stage this error is scoped to, if any.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Network { stage, .. } => *stage,
            Self::Formatting { stage, .. }
            | Self::StageProcessing { stage, .. }
            | Self::PollTimeout { stage, .. }
            | Self::ResultConflict { stage } => Some(*stage),
            _ => None,
        }
    }

    /// Returns true if this error signals an abandoned run.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Attaches a stage to a network error that was raised without one.
    #[must_use]
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            Self::Network {
                stage: None,
                message,
            } => Self::Network {
                stage: Some(stage),
                message,
            },
            other => other,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let Some(stage) = self.stage() {
            map.insert("stage".to_string(), serde_json::json!(stage));
        }
        if let Self::PollTimeout { attempts, .. } = self {
            map.insert("attempts".to_string(), serde_json::json!(attempts));
        }
        map
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(err.to_string())
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience result alias.
pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;
