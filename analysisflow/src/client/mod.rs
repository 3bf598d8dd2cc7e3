//! Backend client for stage processing.
//!
//! This module provides:
//! - The `RemoteStageClient` trait, the integration contract with the backend
//! - Decoded response shapes for process and poll calls
//! - `HttpStageClient`, the HTTP+JSON implementation

mod http;
mod protocol;

pub use http::HttpStageClient;
pub use protocol::{ContextAck, PollResponse, ProcessResponse};

use async_trait::async_trait;

use crate::core::{FormattedResult, Stage};
use crate::errors::Result;

/// Network operations for one analysis backend.
///
/// Every call suspends until its round-trip resolves. Implementations never
/// retry; retry policy belongs to the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStageClient: Send + Sync {
    /// Submits the free-text context. Called once per run, before any stage.
    async fn submit_context(&self, context: &str) -> Result<ContextAck>;

    /// Starts processing a stage.
    async fn process(&self, stage: Stage, payload: serde_json::Value) -> Result<ProcessResponse>;

    /// Formats a raw result (synchronous-result mode only).
    ///
    /// Fails with [`crate::errors::AnalysisError::Formatting`] when the
    /// backend reports a non-success status.
    async fn format(&self, stage: Stage, raw: serde_json::Value) -> Result<FormattedResult>;

    /// Queries the formatted result of an asynchronously processed stage.
    async fn get_formatted_result(&self, stage: Stage) -> Result<PollResponse>;
}
