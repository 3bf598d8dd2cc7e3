//! Step orchestration.
//!
//! The [`StepOrchestrator`] drives one analysis run at a time: it submits the
//! context, runs the required stages in order, then offers each optional
//! stage through the gate. Results are recorded strictly in stage order,
//! but with overlap enabled the process call of the next stage is dispatched
//! while the previous stage is still being formatted or polled.
//!
//! Failure policy: a required-stage failure fails the run, an
//! optional-stage failure is recorded against that stage only.

mod orchestrator_tests;
mod payload;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::client::{HttpStageClient, ProcessResponse, RemoteStageClient};
use crate::config::OrchestratorConfig;
use crate::context::AnalysisRun;
use crate::core::{
    FormattedResult, RunStatus, Stage, StageResult, OPTIONAL_STAGES, REQUIRED_STAGES,
};
use crate::errors::{AnalysisError, Result};
use crate::events::{EventSink, NoOpEventSink, RunEvent};
use crate::gate::OptionalStageGate;
use crate::polling::PollingCompletionWatcher;
use crate::progress::{ProgressProjector, ProgressSnapshot};

/// Raw output (if any) and formatted result of a finished stage.
type Completion = BoxFuture<'static, Result<(Option<serde_json::Value>, FormattedResult)>>;

/// Final account of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run identity.
    pub run_id: Uuid,
    /// Terminal status.
    pub status: RunStatus,
    /// Stage sequence, including accepted optional stages.
    pub active_stages: Vec<Stage>,
    /// Stages in completion order.
    pub completed_stages: Vec<Stage>,
    /// Stages that failed.
    pub failed_stages: Vec<Stage>,
    /// Optional stages the user declined.
    pub declined_stages: Vec<Stage>,
    /// Stored results in completion order.
    pub results: Vec<StageResult>,
    /// Error message of a failed run.
    pub error: Option<String>,
}

impl RunReport {
    fn from_run(run: &AnalysisRun) -> Self {
        Self {
            run_id: run.run_id(),
            status: run.status(),
            active_stages: run.active_stages().to_vec(),
            completed_stages: run.completed_stages().to_vec(),
            failed_stages: run.failed_stages().to_vec(),
            declined_stages: run.declined_stages().to_vec(),
            results: run.store().iter().cloned().collect(),
            error: run.error().map(str::to_string),
        }
    }

    /// Returns the stored result of a stage.
    #[must_use]
    pub fn result(&self, stage: Stage) -> Option<&StageResult> {
        self.results.iter().find(|r| r.stage == stage)
    }
}

/// Handle to a run executing on its own task.
#[derive(Debug)]
pub struct RunHandle {
    run_id: Uuid,
    handle: JoinHandle<RunReport>,
}

impl RunHandle {
    /// Returns the run ID.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns true once the run task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the run to finish.
    pub async fn join(self) -> Result<RunReport> {
        self.handle
            .await
            .map_err(|e| AnalysisError::cancelled(format!("run task ended abnormally: {e}")))
    }
}

#[derive(Clone)]
struct ActiveRun {
    run_id: Uuid,
    state: Arc<Mutex<AnalysisRun>>,
    token: Arc<CancellationToken>,
}

/// Drives analysis runs against a backend.
pub struct StepOrchestrator {
    client: Arc<dyn RemoteStageClient>,
    gate: Arc<dyn OptionalStageGate>,
    sink: Arc<dyn EventSink>,
    watcher: PollingCompletionWatcher,
    config: OrchestratorConfig,
    current: Mutex<Option<ActiveRun>>,
}

impl StepOrchestrator {
    /// Creates an orchestrator that discards events.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::Config` if the configuration fails validation.
    pub fn new(
        client: Arc<dyn RemoteStageClient>,
        gate: Arc<dyn OptionalStageGate>,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let watcher = PollingCompletionWatcher::new(Arc::clone(&client), config.polling);
        Ok(Self {
            client,
            gate,
            sink: Arc::new(NoOpEventSink),
            watcher,
            config,
            current: Mutex::new(None),
        })
    }

    /// Creates an orchestrator talking HTTP to the configured backend.
    pub fn from_config(config: OrchestratorConfig, gate: Arc<dyn OptionalStageGate>) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(HttpStageClient::new(&config.backend)?);
        Self::new(client, gate, config)
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Starts a run on a new task. Any prior run is cancelled.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty or whitespace-only context. No run
    /// is created and the current run, if any, is left untouched.
    pub fn start(self: &Arc<Self>, context: &str) -> Result<RunHandle> {
        let active = self.prepare(context)?;
        let run_id = active.run_id;
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.execute(&active).await });
        Ok(RunHandle { run_id, handle })
    }

    /// Runs to completion on the calling task. Any prior run is cancelled.
    ///
    /// Stage and backend failures are reported in the returned
    /// [`RunReport`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty or whitespace-only context.
    pub async fn run(&self, context: &str) -> Result<RunReport> {
        let active = self.prepare(context)?;
        Ok(self.execute(&active).await)
    }

    /// Cancels the current run.
    ///
    /// In-flight requests are abandoned rather than awaited. Returns false if
    /// there was no run still in progress.
    pub fn cancel(&self) -> bool {
        let Some(active) = self.current.lock().take() else {
            return false;
        };
        let cancelled = Self::abandon(&active, "cancelled by user");
        if cancelled {
            info!(run_id = %active.run_id, "Run cancelled");
            self.sink.try_emit(RunEvent::RunFinished {
                run_id: active.run_id,
                status: RunStatus::Cancelled,
                error: None,
            });
        }
        cancelled
    }

    /// Returns the ID of the current run.
    #[must_use]
    pub fn current_run_id(&self) -> Option<Uuid> {
        self.current.lock().as_ref().map(|a| a.run_id)
    }

    /// Returns a progress snapshot of the current run.
    #[must_use]
    pub fn snapshot(&self) -> Option<ProgressSnapshot> {
        let active = self.current.lock().clone()?;
        let run = active.state.lock();
        Some(ProgressProjector::snapshot(&run))
    }

    fn prepare(&self, context: &str) -> Result<ActiveRun> {
        let run = AnalysisRun::new(context).map_err(|e| {
            warn!(error = %e, "Rejected run submission");
            e
        })?;
        let active = ActiveRun {
            run_id: run.run_id(),
            state: Arc::new(Mutex::new(run)),
            token: Arc::new(CancellationToken::new()),
        };

        let previous = self.current.lock().replace(active.clone());
        if let Some(previous) = previous {
            if Self::abandon(&previous, "superseded by a new run") {
                info!(run_id = %previous.run_id, "Run superseded");
            }
        }
        Ok(active)
    }

    fn abandon(active: &ActiveRun, reason: &str) -> bool {
        active.token.cancel(reason);
        let mut run = active.state.lock();
        if run.status().is_terminal() {
            return false;
        }
        run.finish(RunStatus::Cancelled, None);
        true
    }

    fn is_current(&self, run_id: Uuid) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|a| a.run_id == run_id)
    }

    async fn execute(&self, active: &ActiveRun) -> RunReport {
        let (status, error) = match self.drive(active).await {
            Ok(()) => (RunStatus::Completed, None),
            Err(e) if e.is_cancelled() => (RunStatus::Cancelled, None),
            Err(e) => (RunStatus::Failed, Some(e.to_string())),
        };

        let report = {
            let mut run = active.state.lock();
            run.finish(status, error);
            RunReport::from_run(&run)
        };

        match report.status {
            RunStatus::Completed => info!(
                run_id = %report.run_id,
                completed = report.completed_stages.len(),
                failed = report.failed_stages.len(),
                "Run completed"
            ),
            RunStatus::Failed => warn!(
                run_id = %report.run_id,
                error = report.error.as_deref().unwrap_or_default(),
                "Run failed"
            ),
            _ => debug!(run_id = %report.run_id, status = %report.status, "Run abandoned"),
        }

        self.publish_progress(active).await;
        self.publish(
            active,
            RunEvent::RunFinished {
                run_id: report.run_id,
                status: report.status,
                error: report.error.clone(),
            },
        )
        .await;
        report
    }

    async fn drive(&self, active: &ActiveRun) -> Result<()> {
        let context = {
            let mut run = active.state.lock();
            run.begin();
            run.context().to_string()
        };
        info!(run_id = %active.run_id, "Run started");
        self.publish_progress(active).await;

        let ack = active
            .token
            .guard(self.client.submit_context(&context))
            .await??;
        if !ack.success {
            return Err(AnalysisError::network("backend rejected the submitted context"));
        }

        self.run_required(active).await?;
        self.run_optional(active).await
    }

    async fn run_required(&self, active: &ActiveRun) -> Result<()> {
        let token = &active.token;
        let mut pending: Option<(Stage, Completion)> = None;

        for stage in REQUIRED_STAGES {
            let overlapped = match pending.take() {
                Some((prev, completion))
                    if payload::can_overlap(
                        self.config.overlap,
                        self.config.payload_mode,
                        prev,
                        stage,
                    ) =>
                {
                    Some((prev, completion))
                }
                Some((prev, completion)) => {
                    let outcome = token.guard(completion).await?;
                    self.record(active, prev, outcome).await?;
                    None
                }
                None => None,
            };

            let payload = self.dispatch(active, stage).await?;
            let process = self.client.process(stage, payload);
            let response = match overlapped {
                None => token.guard(process).await?,
                Some((prev, completion)) => {
                    debug!(run_id = %active.run_id, pending = %prev, next = %stage, "Overlapping stages");
                    token
                        .guard(self.overlap(active, prev, completion, process))
                        .await??
                }
            };

            let response = match response {
                Ok(response) => response,
                Err(e) => return Err(self.fail(active, stage, e).await),
            };
            debug!(
                run_id = %active.run_id,
                stage = %stage,
                processing = response.is_processing(),
                "Process call answered"
            );
            pending = Some((stage, self.completion(stage, response)));
        }

        if let Some((prev, completion)) = pending {
            let outcome = token.guard(completion).await?;
            self.record(active, prev, outcome).await?;
        }
        Ok(())
    }

    /// Runs `prev`'s completion alongside the next stage's process call.
    ///
    /// `prev` is always recorded before the process response is handed back,
    /// whichever finishes first. A failure of `prev` abandons the process call.
    async fn overlap<P>(
        &self,
        active: &ActiveRun,
        prev: Stage,
        mut completion: Completion,
        process: P,
    ) -> Result<Result<ProcessResponse>>
    where
        P: Future<Output = Result<ProcessResponse>> + Send,
    {
        tokio::pin!(process);
        let mut recorded = false;
        loop {
            tokio::select! {
                outcome = &mut completion, if !recorded => {
                    recorded = true;
                    self.record(active, prev, outcome).await?;
                }
                response = &mut process => {
                    if !recorded {
                        let outcome = (&mut completion).await;
                        self.record(active, prev, outcome).await?;
                    }
                    return Ok(response);
                }
            }
        }
    }

    async fn run_optional(&self, active: &ActiveRun) -> Result<()> {
        for stage in OPTIONAL_STAGES {
            if active.state.lock().was_offered(stage) {
                continue;
            }

            self.publish(
                active,
                RunEvent::DecisionRequested {
                    run_id: active.run_id,
                    stage,
                },
            )
            .await;
            let accepted = active.token.guard(self.gate.ask(stage)).await?;

            if !accepted {
                active.state.lock().decline(stage);
                info!(run_id = %active.run_id, stage = %stage, "Optional stage declined");
                continue;
            }

            if !active.state.lock().append_optional(stage)? {
                continue;
            }
            info!(run_id = %active.run_id, stage = %stage, "Optional stage accepted");
            self.publish_progress(active).await;

            match self.run_stage(active, stage).await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(run_id = %active.run_id, stage = %stage, error = %e, "Optional stage failed, continuing");
                }
            }
        }
        Ok(())
    }

    /// Runs one stage without overlap.
    async fn run_stage(&self, active: &ActiveRun, stage: Stage) -> Result<()> {
        let payload = self.dispatch(active, stage).await?;
        let response = match active.token.guard(self.client.process(stage, payload)).await? {
            Ok(response) => response,
            Err(e) => return Err(self.fail(active, stage, e).await),
        };
        let outcome = active.token.guard(self.completion(stage, response)).await?;
        self.record(active, stage, outcome).await
    }

    async fn dispatch(&self, active: &ActiveRun, stage: Stage) -> Result<serde_json::Value> {
        let payload = {
            let mut run = active.state.lock();
            run.dispatch(stage)?;
            payload::build_payload(self.config.payload_mode, stage, run.store())
        };
        debug!(run_id = %active.run_id, stage = %stage, "Stage dispatched");
        self.publish_progress(active).await;
        Ok(payload)
    }

    /// Builds the future that turns a process response into a formatted result.
    fn completion(&self, stage: Stage, response: ProcessResponse) -> Completion {
        match response {
            ProcessResponse::Ready(raw) => {
                let client = Arc::clone(&self.client);
                async move {
                    let formatted = client.format(stage, raw.clone()).await?;
                    Ok((Some(raw), formatted))
                }
                .boxed()
            }
            ProcessResponse::Processing => {
                let watcher = self.watcher.clone();
                async move { watcher.await_result(stage).await.map(|f| (None, f)) }.boxed()
            }
        }
    }

    async fn record(
        &self,
        active: &ActiveRun,
        stage: Stage,
        outcome: Result<(Option<serde_json::Value>, FormattedResult)>,
    ) -> Result<()> {
        let (raw, formatted) = match outcome {
            Ok(parts) => parts,
            Err(e) => return Err(self.fail(active, stage, e).await),
        };

        let result = StageResult::new(stage, raw, formatted);
        active.state.lock().complete(result.clone())?;
        info!(run_id = %active.run_id, stage = %stage, "Stage completed");

        self.publish(
            active,
            RunEvent::StageCompleted {
                run_id: active.run_id,
                result,
            },
        )
        .await;
        self.publish_progress(active).await;
        Ok(())
    }

    /// Marks `stage` failed and returns the error to propagate.
    async fn fail(&self, active: &ActiveRun, stage: Stage, error: AnalysisError) -> AnalysisError {
        if error.is_cancelled() {
            return error;
        }
        let error = error.in_stage(stage);

        let marked = active.state.lock().fail_stage(stage);
        if let Err(e) = marked {
            warn!(run_id = %active.run_id, stage = %stage, error = %e, "Could not mark stage failed");
        }
        warn!(run_id = %active.run_id, stage = %stage, error = %error, "Stage failed");

        self.publish(
            active,
            RunEvent::StageFailed {
                run_id: active.run_id,
                stage,
                kind: error.kind(),
                error: error.to_string(),
            },
        )
        .await;
        self.publish_progress(active).await;
        error
    }

    async fn publish_progress(&self, active: &ActiveRun) {
        let snapshot = ProgressProjector::snapshot(&active.state.lock());
        self.publish(active, RunEvent::Progress(snapshot)).await;
    }

    /// Emits an event if its run is still the current one.
    async fn publish(&self, active: &ActiveRun, event: RunEvent) {
        if self.is_current(active.run_id) {
            self.sink.emit(event).await;
        } else {
            debug!(run_id = %active.run_id, event_type = event.event_type(), "Dropping event from abandoned run");
        }
    }
}

impl std::fmt::Debug for StepOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepOrchestrator")
            .field("config", &self.config)
            .field("current_run_id", &self.current_run_id())
            .finish_non_exhaustive()
    }
}
