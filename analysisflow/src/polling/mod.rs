//! Bounded polling for asynchronously processed stages.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::{PollResponse, RemoteStageClient};
use crate::config::PollConfig;
use crate::core::{FormattedResult, Stage};
use crate::errors::{AnalysisError, Result};

/// Waits for a stage's formatted result by polling the backend.
///
/// Each attempt sleeps one interval and then queries, so a stage that
/// reports complete on the n-th query resolves after exactly n intervals.
#[derive(Clone)]
pub struct PollingCompletionWatcher {
    client: Arc<dyn RemoteStageClient>,
    config: PollConfig,
}

impl PollingCompletionWatcher {
    /// Creates a watcher.
    #[must_use]
    pub fn new(client: Arc<dyn RemoteStageClient>, config: PollConfig) -> Self {
        Self { client, config }
    }

    /// Returns the polling parameters.
    #[must_use]
    pub const fn config(&self) -> PollConfig {
        self.config
    }

    /// Polls until the stage completes, fails, or the attempt bound is hit.
    ///
    /// # Errors
    ///
    /// - `StageProcessing` if the backend reports an error for the stage
    /// - `PollTimeout` after `max_attempts` queries without completion
    /// - any transport error from the query itself, unretried
    pub async fn await_result(&self, stage: Stage) -> Result<FormattedResult> {
        let interval = self.config.interval();

        for attempt in 1..=self.config.max_attempts {
            tokio::time::sleep(interval).await;

            match self.client.get_formatted_result(stage).await? {
                PollResponse::Complete(formatted) => {
                    debug!(stage = %stage, attempt, "Formatted result ready");
                    return Ok(formatted);
                }
                PollResponse::Failed(message) => {
                    warn!(stage = %stage, attempt, error = %message, "Backend reported stage failure");
                    return Err(AnalysisError::stage_processing(stage, message));
                }
                PollResponse::Pending(status) => {
                    debug!(stage = %stage, attempt, status = %status, "Stage still processing");
                }
            }
        }

        warn!(stage = %stage, attempts = self.config.max_attempts, "Polling exhausted");
        Err(AnalysisError::poll_timeout(stage, self.config.max_attempts))
    }
}

impl std::fmt::Debug for PollingCompletionWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingCompletionWatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockRemoteStageClient;
    use crate::core::Section;
    use mockall::Sequence;
    use std::time::Duration;
    use tokio::time::Instant;

    fn watcher(mock: MockRemoteStageClient, config: PollConfig) -> PollingCompletionWatcher {
        PollingCompletionWatcher::new(Arc::new(mock), config)
    }

    fn pitch() -> FormattedResult {
        FormattedResult::new(vec![Section::new("Pitch", "Raise a seed round.")])
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_after_exactly_two_intervals() {
        let mut mock = MockRemoteStageClient::new();
        let mut seq = Sequence::new();
        mock.expect_get_formatted_result()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(PollResponse::Pending("processing".to_string())));
        mock.expect_get_formatted_result()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(PollResponse::Complete(pitch())));

        let start = Instant::now();
        let result = watcher(mock, PollConfig::default())
            .await_result(Stage::Deck)
            .await
            .unwrap();

        assert_eq!(result, pitch());
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_bound_without_extra_polls() {
        let mut mock = MockRemoteStageClient::new();
        mock.expect_get_formatted_result()
            .times(30)
            .returning(|_| Ok(PollResponse::Pending("processing".to_string())));

        let start = Instant::now();
        let err = watcher(mock, PollConfig::default())
            .await_result(Stage::Justification)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AnalysisError::PollTimeout { stage: Stage::Justification, attempts: 30 }
        ));
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_fails_immediately() {
        let mut mock = MockRemoteStageClient::new();
        mock.expect_get_formatted_result()
            .times(1)
            .returning(|_| Ok(PollResponse::Failed("agent crashed".to_string())));

        let err = watcher(mock, PollConfig::new(250, 10))
            .await_result(Stage::Cost)
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::StageProcessing { stage: Stage::Cost, .. }));
        assert!(err.to_string().contains("agent crashed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_propagates() {
        let mut mock = MockRemoteStageClient::new();
        mock.expect_get_formatted_result()
            .times(1)
            .returning(|stage| Err(AnalysisError::network_in(stage, "connection reset")));

        let err = watcher(mock, PollConfig::default())
            .await_result(Stage::Roi)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Roi));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_completes_early() {
        let mut mock = MockRemoteStageClient::new();
        mock.expect_get_formatted_result()
            .returning(|_| Ok(PollResponse::Complete(pitch())));

        let handle = tokio::spawn(async move {
            watcher(mock, PollConfig::default()).await_result(Stage::Deck).await
        });

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(!handle.is_finished());

        assert!(handle.await.unwrap().is_ok());
    }
}
