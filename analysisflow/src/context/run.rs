//! The aggregate root for one analysis submission.

use uuid::Uuid;

use super::RunIdentity;
use crate::core::{RunStatus, Stage, StageResult, StageStatus, REQUIRED_STAGES};
use crate::errors::{AnalysisError, Result};
use crate::store::ResultStore;

/// State of one analysis run.
///
/// `active_stages` starts as the required list and only ever grows by
/// appending accepted optional stages. Every completed or failed stage is a
/// member of `active_stages`, and `current_index` never exceeds its length.
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    identity: RunIdentity,
    context: String,
    active_stages: Vec<Stage>,
    current_index: usize,
    in_flight: Vec<Stage>,
    failed: Vec<Stage>,
    declined: Vec<Stage>,
    status: RunStatus,
    error: Option<String>,
    store: ResultStore,
}

impl AnalysisRun {
    /// Creates a run for the given context.
    ///
    /// The context is trimmed; an empty result is rejected with
    /// [`AnalysisError::InvalidInput`].
    pub fn new(context: &str) -> Result<Self> {
        let context = context.trim();
        if context.is_empty() {
            return Err(AnalysisError::invalid_input("context must not be empty"));
        }
        Ok(Self {
            identity: RunIdentity::new(),
            context: context.to_string(),
            active_stages: REQUIRED_STAGES.to_vec(),
            current_index: 0,
            in_flight: Vec::new(),
            failed: Vec::new(),
            declined: Vec::new(),
            status: RunStatus::Idle,
            error: None,
            store: ResultStore::new(),
        })
    }

    /// Returns the run identity.
    #[must_use]
    pub const fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Returns the run ID.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.identity.run_id
    }

    /// Returns the submitted context.
    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Stages in execution order.
    #[must_use]
    pub fn active_stages(&self) -> &[Stage] {
        &self.active_stages
    }

    /// Index of the most recently dispatched stage, or the sequence length
    /// when nothing is waiting to be dispatched.
    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current_index
    }

    /// Stages dispatched but not yet complete or failed.
    #[must_use]
    pub fn in_flight(&self) -> &[Stage] {
        &self.in_flight
    }

    /// Stages in completion order.
    #[must_use]
    pub fn completed_stages(&self) -> &[Stage] {
        self.store.completed_stages()
    }

    /// Stages that failed, in failure order.
    #[must_use]
    pub fn failed_stages(&self) -> &[Stage] {
        &self.failed
    }

    /// Optional stages the user declined.
    #[must_use]
    pub fn declined_stages(&self) -> &[Stage] {
        &self.declined
    }

    /// Returns the run status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Returns the terminal error message, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns the result store.
    #[must_use]
    pub const fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Returns the per-stage status.
    #[must_use]
    pub fn stage_status(&self, stage: Stage) -> StageStatus {
        if self.store.is_complete(stage) {
            StageStatus::Complete
        } else if self.failed.contains(&stage) {
            StageStatus::Failed
        } else if self.in_flight.contains(&stage) {
            StageStatus::Active
        } else {
            StageStatus::Pending
        }
    }

    /// Moves the run from idle to running.
    pub fn begin(&mut self) {
        if self.status == RunStatus::Idle {
            self.status = RunStatus::Running;
        }
    }

    /// Marks a stage as dispatched.
    pub fn dispatch(&mut self, stage: Stage) -> Result<()> {
        let index = self.position(stage)?;
        if self.stage_status(stage) != StageStatus::Pending {
            return Err(AnalysisError::invalid_input(format!(
                "stage '{stage}' has already been dispatched"
            )));
        }
        self.current_index = index;
        self.in_flight.push(stage);
        Ok(())
    }

    /// Stores a stage result and marks the stage complete.
    pub fn complete(&mut self, result: StageResult) -> Result<()> {
        let stage = result.stage;
        self.position(stage)?;
        self.store.set(result)?;
        self.in_flight.retain(|s| *s != stage);
        Ok(())
    }

    /// Marks a stage as failed.
    pub fn fail_stage(&mut self, stage: Stage) -> Result<()> {
        self.position(stage)?;
        self.in_flight.retain(|s| *s != stage);
        if !self.failed.contains(&stage) && !self.store.is_complete(stage) {
            self.failed.push(stage);
        }
        Ok(())
    }

    /// Returns true if the gate has already been consulted for this stage.
    #[must_use]
    pub fn was_offered(&self, stage: Stage) -> bool {
        self.declined.contains(&stage) || self.active_stages.contains(&stage)
    }

    /// Appends an accepted optional stage to the sequence.
    ///
    /// Returns false if the stage was already offered in this run.
    pub fn append_optional(&mut self, stage: Stage) -> Result<bool> {
        if stage.is_required() {
            return Err(AnalysisError::invalid_input(format!(
                "stage '{stage}' is required and cannot be appended"
            )));
        }
        if self.was_offered(stage) {
            return Ok(false);
        }
        self.active_stages.push(stage);
        Ok(true)
    }

    /// Records that the user declined an optional stage.
    pub fn decline(&mut self, stage: Stage) {
        if !self.was_offered(stage) {
            self.declined.push(stage);
        }
    }

    /// Marks that no stage is waiting to be dispatched.
    pub fn park(&mut self) {
        self.current_index = self.active_stages.len();
    }

    /// Moves the run to a terminal status.
    pub fn finish(&mut self, status: RunStatus, error: Option<String>) {
        if self.status.is_terminal() {
            return;
        }
        if status == RunStatus::Completed {
            self.park();
        }
        self.status = status;
        self.error = error;
    }

    fn position(&self, stage: Stage) -> Result<usize> {
        self.active_stages
            .iter()
            .position(|s| *s == stage)
            .ok_or_else(|| {
                AnalysisError::invalid_input(format!("stage '{stage}' is not part of this run"))
            })
    }
}
