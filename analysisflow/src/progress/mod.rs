//! Presentation-agnostic progress snapshots.
//!
//! A snapshot is recomputed from run state on every transition instead of
//! being patched incrementally, so the rendered progress can never drift
//! from the run it describes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::AnalysisRun;
use crate::core::{RunStatus, Stage, StageStatus};

/// Progress of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    /// The stage.
    pub stage: Stage,
    /// Its current status.
    pub status: StageStatus,
}

/// Immutable view of a run's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// The run this snapshot describes.
    pub run_id: Uuid,
    /// Run-level status.
    pub run_status: RunStatus,
    /// Index of the most recently dispatched stage, or the sequence length
    /// when no stage is in progress.
    pub current_index: usize,
    /// Per-stage progress in sequence order.
    pub stages: Vec<StageProgress>,
}

impl ProgressSnapshot {
    /// Number of completed stages.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.count(StageStatus::Complete)
    }

    /// Stages that are currently active.
    #[must_use]
    pub fn active_stages(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|p| p.status == StageStatus::Active)
            .map(|p| p.stage)
            .collect()
    }

    /// Status of a stage, or `None` if it is not part of the sequence.
    #[must_use]
    pub fn status_of(&self, stage: Stage) -> Option<StageStatus> {
        self.stages.iter().find(|p| p.stage == stage).map(|p| p.status)
    }

    fn count(&self, status: StageStatus) -> usize {
        self.stages.iter().filter(|p| p.status == status).count()
    }
}

/// Derives progress snapshots from run state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressProjector;

impl ProgressProjector {
    /// Projects the per-stage status list.
    ///
    /// A stage is complete once it has a stored result and failed once it is
    /// marked failed. Otherwise it is active if it sits at `current_index` or
    /// is still awaiting its formatted result while the next stage's process
    /// call is already in flight. Everything else is pending.
    #[must_use]
    pub fn project(
        active_stages: &[Stage],
        current_index: usize,
        completed: &[Stage],
        failed: &[Stage],
        in_flight: &[Stage],
    ) -> Vec<StageProgress> {
        active_stages
            .iter()
            .enumerate()
            .map(|(index, &stage)| {
                let status = if completed.contains(&stage) {
                    StageStatus::Complete
                } else if failed.contains(&stage) {
                    StageStatus::Failed
                } else if index == current_index || in_flight.contains(&stage) {
                    StageStatus::Active
                } else {
                    StageStatus::Pending
                };
                StageProgress { stage, status }
            })
            .collect()
    }

    /// Builds a full snapshot of a run.
    #[must_use]
    pub fn snapshot(run: &AnalysisRun) -> ProgressSnapshot {
        let started = !run.in_flight().is_empty()
            || !run.completed_stages().is_empty()
            || !run.failed_stages().is_empty();
        // Nothing is active before the first dispatch or after the run ends.
        let (current_index, in_flight) = if run.status() == RunStatus::Running && started {
            (run.current_index(), run.in_flight())
        } else {
            (run.active_stages().len(), &[][..])
        };

        ProgressSnapshot {
            run_id: run.run_id(),
            run_status: run.status(),
            current_index,
            stages: Self::project(
                run.active_stages(),
                current_index,
                run.completed_stages(),
                run.failed_stages(),
                in_flight,
            ),
        }
    }
}
