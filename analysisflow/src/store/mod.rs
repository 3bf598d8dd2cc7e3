//! Per-run storage of stage results.

use std::collections::HashMap;

use crate::core::{Stage, StageResult};
use crate::errors::{AnalysisError, Result};

/// Holds the results of one analysis run.
///
/// Each stage can be written exactly once. The store also remembers the order
/// in which stages completed so progress can be rendered in that order.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    results: HashMap<Stage, StageResult>,
    order: Vec<Stage>,
}

impl ResultStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the result for its stage.
    ///
    /// Fails with [`AnalysisError::ResultConflict`] if the stage already has
    /// a result; the stored value is left untouched.
    pub fn set(&mut self, result: StageResult) -> Result<()> {
        let stage = result.stage;
        if self.results.contains_key(&stage) {
            return Err(AnalysisError::ResultConflict { stage });
        }
        self.results.insert(stage, result);
        self.order.push(stage);
        Ok(())
    }

    /// Gets the result for a stage.
    #[must_use]
    pub fn get(&self, stage: Stage) -> Option<&StageResult> {
        self.results.get(&stage)
    }

    /// Returns true if the stage has a stored result.
    #[must_use]
    pub fn is_complete(&self, stage: Stage) -> bool {
        self.results.contains_key(&stage)
    }

    /// Stages in completion order.
    #[must_use]
    pub fn completed_stages(&self) -> &[Stage] {
        &self.order
    }

    /// Results in completion order.
    pub fn iter(&self) -> impl Iterator<Item = &StageResult> {
        self.order.iter().filter_map(|stage| self.results.get(stage))
    }

    /// Number of stored results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
