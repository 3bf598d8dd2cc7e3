//! Response shapes of the analysis backend.
//!
//! The backend answers a process call either with the finished result or with
//! a "processing" acknowledgement. Which one arrives is observed per call and
//! resolved by the discriminant fields of the JSON body, never by stage.

use serde::{Deserialize, Serialize};

use crate::core::{FormattedResult, Stage};
use crate::errors::{AnalysisError, Result};

/// Acknowledgement of a context submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextAck {
    /// Whether the backend accepted the context.
    #[serde(default = "default_success")]
    pub success: bool,
}

fn default_success() -> bool {
    true
}

impl Default for ContextAck {
    fn default() -> Self {
        Self { success: true }
    }
}

/// Outcome of a process call.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessResponse {
    /// Synchronous-result mode: the raw result is available now.
    Ready(serde_json::Value),
    /// Asynchronous mode: the result must be polled for.
    Processing,
}

impl ProcessResponse {
    /// Decodes a process response body.
    ///
    /// `{"result": …}` is a ready result, `{"status": "processing"}` an
    /// acknowledgement, and `{"error": …}` a stage failure.
    pub fn from_value(stage: Stage, value: serde_json::Value) -> Result<Self> {
        if let Some(message) = error_message(&value) {
            return Err(AnalysisError::stage_processing(stage, message));
        }
        if let Some(result) = value.get("result") {
            return Ok(Self::Ready(result.clone()));
        }
        match value.get("status").and_then(serde_json::Value::as_str) {
            Some("processing") => Ok(Self::Processing),
            Some(other) => Err(AnalysisError::stage_processing(
                stage,
                format!("unexpected process status '{other}'"),
            )),
            None => Err(AnalysisError::Serialization(format!(
                "process response for stage '{stage}' has neither result nor status"
            ))),
        }
    }

    /// Returns true for the asynchronous acknowledgement.
    #[must_use]
    pub const fn is_processing(&self) -> bool {
        matches!(self, Self::Processing)
    }
}

/// Outcome of one poll of the formatted-result endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum PollResponse {
    /// The formatted result is ready.
    Complete(FormattedResult),
    /// The backend reported an error for the stage.
    Failed(String),
    /// Not ready yet; carries the reported status.
    Pending(String),
}

impl PollResponse {
    /// Decodes a poll response body.
    pub fn from_value(stage: Stage, value: &serde_json::Value) -> Result<Self> {
        if let Some(message) = error_message(value) {
            return Ok(Self::Failed(message));
        }
        match value.get("status").and_then(serde_json::Value::as_str) {
            Some("complete") => {
                let formatted = value.get("formatted_result").cloned().ok_or_else(|| {
                    AnalysisError::Serialization(format!(
                        "complete poll response for stage '{stage}' is missing formatted_result"
                    ))
                })?;
                Ok(Self::Complete(FormattedResult::from_value(formatted)))
            }
            Some(other) => Ok(Self::Pending(other.to_string())),
            None => Ok(Self::Pending("unknown".to_string())),
        }
    }
}

/// Extracts a non-null `error` field as text.
pub(crate) fn error_message(value: &serde_json::Value) -> Option<String> {
    match value.get("error")? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
