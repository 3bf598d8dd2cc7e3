//! User decisions on optional stages.
//!
//! The orchestrator asks the gate once per optional stage and suspends until
//! the answer arrives. There is no timeout: a run waits on the user for as
//! long as it takes, unless the run itself is cancelled.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

use crate::core::Stage;

/// Source of accept/decline decisions for optional stages.
#[async_trait]
pub trait OptionalStageGate: Send + Sync {
    /// Asks whether the optional stage should run.
    async fn ask(&self, stage: Stage) -> bool;
}

/// A decision awaiting an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// Identifier to answer with.
    pub request_id: Uuid,
    /// The optional stage being offered.
    pub stage: Stage,
    /// Prompt title.
    pub title: String,
    /// Prompt body.
    pub description: String,
}

impl DecisionRequest {
    fn for_stage(stage: Stage) -> Self {
        let (title, description) = stage.prompt().map_or_else(
            || (format!("Run {}?", stage.label()), String::new()),
            |p| (p.title.to_string(), p.description.to_string()),
        );
        Self {
            request_id: Uuid::new_v4(),
            stage,
            title,
            description,
        }
    }
}

#[derive(Debug)]
struct PendingDecision {
    request: DecisionRequest,
    response_tx: oneshot::Sender<bool>,
}

/// Gate answered asynchronously through `accept` and `decline`.
///
/// Pending decisions are listed by [`ChannelGate::pending_requests`] and,
/// when a notifier is attached, pushed to it as they are raised. A decision
/// whose answer channel is dropped resolves as declined.
#[derive(Default)]
pub struct ChannelGate {
    pending: RwLock<HashMap<Uuid, PendingDecision>>,
    notifier: Option<mpsc::UnboundedSender<DecisionRequest>>,
}

impl ChannelGate {
    /// Creates a gate without a notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a gate that pushes every new request into the returned receiver.
    #[must_use]
    pub fn with_notifier() -> (Self, mpsc::UnboundedReceiver<DecisionRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Self {
            pending: RwLock::default(),
            notifier: Some(tx),
        };
        (gate, rx)
    }

    /// Accepts a pending decision. Returns false if the id is unknown.
    pub fn accept(&self, request_id: Uuid) -> bool {
        self.answer(request_id, true)
    }

    /// Declines a pending decision. Returns false if the id is unknown.
    pub fn decline(&self, request_id: Uuid) -> bool {
        self.answer(request_id, false)
    }

    /// Drops every pending decision; each resolves as declined.
    pub fn decline_all(&self) {
        self.pending.write().clear();
    }

    /// Lists pending decisions.
    #[must_use]
    pub fn pending_requests(&self) -> Vec<DecisionRequest> {
        self.pending
            .read()
            .values()
            .map(|p| p.request.clone())
            .collect()
    }

    /// Returns the number of pending decisions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.read().len()
    }

    fn answer(&self, request_id: Uuid, accepted: bool) -> bool {
        let Some(decision) = self.pending.write().remove(&request_id) else {
            return false;
        };
        debug!(stage = %decision.request.stage, accepted, "Decision answered");
        decision.response_tx.send(accepted).is_ok()
    }
}

/// Removes the pending entry if `ask` is dropped before an answer arrives.
struct PendingGuard<'a> {
    gate: &'a ChannelGate,
    request_id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.gate.pending.write().remove(&self.request_id);
    }
}

#[async_trait]
impl OptionalStageGate for ChannelGate {
    async fn ask(&self, stage: Stage) -> bool {
        let request = DecisionRequest::for_stage(stage);
        let request_id = request.request_id;
        let (tx, rx) = oneshot::channel();

        self.pending.write().insert(
            request_id,
            PendingDecision {
                request: request.clone(),
                response_tx: tx,
            },
        );
        let _guard = PendingGuard {
            gate: self,
            request_id,
        };

        if let Some(notifier) = &self.notifier {
            let _ = notifier.send(request);
        }

        rx.await.unwrap_or(false)
    }
}

impl std::fmt::Debug for ChannelGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelGate")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}
