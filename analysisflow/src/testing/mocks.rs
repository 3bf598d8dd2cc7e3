//! Scripted backend and gate for driving orchestrator runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use crate::client::{ContextAck, PollResponse, ProcessResponse, RemoteStageClient};
use crate::core::{FormattedResult, Section, Stage};
use crate::errors::{AnalysisError, Result};
use crate::gate::OptionalStageGate;

/// How a scripted stage answers a process call.
#[derive(Debug, Clone)]
enum Mode {
    /// Process returns the raw result; format returns the formatted one.
    Sync {
        raw: serde_json::Value,
        formatted: FormattedResult,
    },
    /// Process acknowledges; polls report pending `pending_polls` times.
    Polling {
        pending_polls: u32,
        formatted: FormattedResult,
    },
    /// Process fails.
    ProcessError(AnalysisError),
    /// Process succeeds synchronously; format fails.
    FormatError(String),
    /// Process acknowledges; the first poll reports an error.
    PollFailure(String),
}

/// Script for a single stage.
#[derive(Debug, Clone)]
pub struct StageScript {
    mode: Mode,
    process_delay: Duration,
    format_delay: Duration,
}

impl StageScript {
    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            process_delay: Duration::ZERO,
            format_delay: Duration::ZERO,
        }
    }

    /// Synchronous-result mode with the given formatted output.
    #[must_use]
    pub fn sync(raw: impl Into<serde_json::Value>, formatted: FormattedResult) -> Self {
        Self::with_mode(Mode::Sync {
            raw: raw.into(),
            formatted,
        })
    }

    /// Polling mode: `pending_polls` "processing" answers, then complete.
    #[must_use]
    pub fn polling(pending_polls: u32, formatted: FormattedResult) -> Self {
        Self::with_mode(Mode::Polling {
            pending_polls,
            formatted,
        })
    }

    /// The process call fails with `error`.
    #[must_use]
    pub fn process_error(error: AnalysisError) -> Self {
        Self::with_mode(Mode::ProcessError(error))
    }

    /// The format call fails with a formatting error.
    #[must_use]
    pub fn format_error(message: impl Into<String>) -> Self {
        Self::with_mode(Mode::FormatError(message.into()))
    }

    /// Polling mode where the backend reports an error on the first poll.
    #[must_use]
    pub fn poll_failure(message: impl Into<String>) -> Self {
        Self::with_mode(Mode::PollFailure(message.into()))
    }

    /// Delays the process call.
    #[must_use]
    pub const fn with_process_delay(mut self, delay: Duration) -> Self {
        self.process_delay = delay;
        self
    }

    /// Delays the format call.
    #[must_use]
    pub const fn with_format_delay(mut self, delay: Duration) -> Self {
        self.format_delay = delay;
        self
    }
}

/// A backend call, as recorded by [`ScriptedStageClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCall {
    /// `submit_context(context)`.
    SubmitContext(String),
    /// `process(stage, payload)`.
    Process(Stage, serde_json::Value),
    /// `format(stage, raw)`.
    Format(Stage, serde_json::Value),
    /// `get_formatted_result(stage)`.
    Poll(Stage),
}

impl ClientCall {
    /// Returns the stage of a stage-scoped call.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::SubmitContext(_) => None,
            Self::Process(stage, _) | Self::Format(stage, _) | Self::Poll(stage) => Some(*stage),
        }
    }
}

/// The default formatted output a scripted stage produces.
#[must_use]
pub fn sample_formatted(stage: Stage) -> FormattedResult {
    FormattedResult::new(vec![Section::new(
        format!("{} Analysis", stage.label()),
        format!("Scripted {stage} analysis."),
    )])
    .with_key_points(vec![format!("{} looks viable", stage.label())])
}

/// A backend that answers from per-stage scripts and records every call.
///
/// Stages without a script answer synchronously with
/// [`sample_formatted`].
#[derive(Debug, Default)]
pub struct ScriptedStageClient {
    scripts: HashMap<Stage, StageScript>,
    submit_error: Option<AnalysisError>,
    calls: Mutex<Vec<ClientCall>>,
    polls: Mutex<HashMap<Stage, u32>>,
}

impl ScriptedStageClient {
    /// Creates a client where every stage succeeds synchronously.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts one stage.
    #[must_use]
    pub fn with_stage(mut self, stage: Stage, script: StageScript) -> Self {
        self.scripts.insert(stage, script);
        self
    }

    /// Scripts every stage the same way.
    #[must_use]
    pub fn with_all(mut self, script: &StageScript) -> Self {
        for stage in Stage::all() {
            self.scripts.insert(stage, script.clone());
        }
        self
    }

    /// Makes `submit_context` fail.
    #[must_use]
    pub fn with_submit_error(mut self, error: AnalysisError) -> Self {
        self.submit_error = Some(error);
        self
    }

    /// Returns every recorded call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ClientCall> {
        self.calls.lock().clone()
    }

    /// Stages in the order their process calls were made.
    #[must_use]
    pub fn processed_stages(&self) -> Vec<Stage> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                ClientCall::Process(stage, _) => Some(*stage),
                _ => None,
            })
            .collect()
    }

    /// Payload of a stage's process call, if it was made.
    #[must_use]
    pub fn payload_for(&self, stage: Stage) -> Option<serde_json::Value> {
        self.calls.lock().iter().find_map(|c| match c {
            ClientCall::Process(s, payload) if *s == stage => Some(payload.clone()),
            _ => None,
        })
    }

    /// Number of polls made for a stage.
    #[must_use]
    pub fn poll_count(&self, stage: Stage) -> u32 {
        self.polls.lock().get(&stage).copied().unwrap_or(0)
    }

    /// Returns true if any call was made for the stage.
    #[must_use]
    pub fn was_called(&self, stage: Stage) -> bool {
        self.calls.lock().iter().any(|c| c.stage() == Some(stage))
    }

    fn script(&self, stage: Stage) -> StageScript {
        self.scripts.get(&stage).cloned().unwrap_or_else(|| {
            StageScript::sync(format!("raw {stage} analysis"), sample_formatted(stage))
        })
    }

    fn record(&self, call: ClientCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl RemoteStageClient for ScriptedStageClient {
    async fn submit_context(&self, context: &str) -> Result<ContextAck> {
        self.record(ClientCall::SubmitContext(context.to_string()));
        match &self.submit_error {
            Some(error) => Err(error.clone()),
            None => Ok(ContextAck::default()),
        }
    }

    async fn process(&self, stage: Stage, payload: serde_json::Value) -> Result<ProcessResponse> {
        self.record(ClientCall::Process(stage, payload));
        let script = self.script(stage);
        if !script.process_delay.is_zero() {
            tokio::time::sleep(script.process_delay).await;
        }
        match script.mode {
            Mode::Sync { raw, .. } => Ok(ProcessResponse::Ready(raw)),
            Mode::FormatError(_) => Ok(ProcessResponse::Ready(serde_json::json!(format!(
                "raw {stage} analysis"
            )))),
            Mode::Polling { .. } | Mode::PollFailure(_) => Ok(ProcessResponse::Processing),
            Mode::ProcessError(error) => Err(error),
        }
    }

    async fn format(&self, stage: Stage, raw: serde_json::Value) -> Result<FormattedResult> {
        self.record(ClientCall::Format(stage, raw));
        let script = self.script(stage);
        if !script.format_delay.is_zero() {
            tokio::time::sleep(script.format_delay).await;
        }
        match script.mode {
            Mode::Sync { formatted, .. } | Mode::Polling { formatted, .. } => Ok(formatted),
            Mode::FormatError(message) => Err(AnalysisError::formatting(stage, message)),
            Mode::ProcessError(error) => Err(error),
            Mode::PollFailure(message) => Err(AnalysisError::formatting(stage, message)),
        }
    }

    async fn get_formatted_result(&self, stage: Stage) -> Result<PollResponse> {
        self.record(ClientCall::Poll(stage));
        let attempt = {
            let mut polls = self.polls.lock();
            let count = polls.entry(stage).or_insert(0);
            *count += 1;
            *count
        };
        match self.script(stage).mode {
            Mode::Polling {
                pending_polls,
                formatted,
            } => {
                if attempt > pending_polls {
                    Ok(PollResponse::Complete(formatted))
                } else {
                    Ok(PollResponse::Pending("processing".to_string()))
                }
            }
            Mode::PollFailure(message) => Ok(PollResponse::Failed(message)),
            _ => Ok(PollResponse::Pending("not_started".to_string())),
        }
    }
}

/// A gate that answers from a fixed set of accepted stages.
#[derive(Debug, Default)]
pub struct ScriptedGate {
    accepted: Vec<Stage>,
    asked: Mutex<Vec<Stage>>,
}

impl ScriptedGate {
    /// Creates a gate that declines everything.
    #[must_use]
    pub fn declining() -> Self {
        Self::default()
    }

    /// Creates a gate that accepts exactly the given stages.
    #[must_use]
    pub fn accepting(stages: &[Stage]) -> Self {
        Self {
            accepted: stages.to_vec(),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Stages the gate was asked about, in order.
    #[must_use]
    pub fn asked(&self) -> Vec<Stage> {
        self.asked.lock().clone()
    }
}

#[async_trait]
impl OptionalStageGate for ScriptedGate {
    async fn ask(&self, stage: Stage) -> bool {
        self.asked.lock().push(stage);
        self.accepted.contains(&stage)
    }
}
