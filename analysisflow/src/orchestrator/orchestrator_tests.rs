//! End-to-end orchestrator scenarios against a scripted backend.

#[cfg(test)]
mod tests {
    use crate::config::{OrchestratorConfig, PayloadMode, PollConfig};
    use crate::core::{
        FormattedResult, Metric, RunStatus, Section, Stage, StageStatus, REQUIRED_STAGES,
    };
    use crate::errors::{AnalysisError, ErrorKind};
    use crate::events::{CollectingEventSink, RunEvent};
    use crate::gate::{ChannelGate, OptionalStageGate};
    use crate::orchestrator::StepOrchestrator;
    use crate::testing::{sample_formatted, ClientCall, ScriptedGate, ScriptedStageClient, StageScript};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    const CONTEXT: &str = "a coffee subscription service";

    struct Harness {
        client: Arc<ScriptedStageClient>,
        gate: Arc<ScriptedGate>,
        sink: Arc<CollectingEventSink>,
        orchestrator: Arc<StepOrchestrator>,
    }

    fn harness(client: ScriptedStageClient, gate: ScriptedGate, config: OrchestratorConfig) -> Harness {
        let client = Arc::new(client);
        let gate = Arc::new(gate);
        let sink = Arc::new(CollectingEventSink::new());
        let orchestrator = Arc::new(
            StepOrchestrator::new(client.clone(), gate.clone(), config)
                .unwrap()
                .with_event_sink(sink.clone()),
        );
        Harness {
            client,
            gate,
            sink,
            orchestrator,
        }
    }

    fn completed_order(sink: &CollectingEventSink) -> Vec<Stage> {
        sink.events()
            .into_iter()
            .filter_map(|e| match e {
                RunEvent::StageCompleted { result, .. } => Some(result.stage),
                _ => None,
            })
            .collect()
    }

    fn delayed(process_ms: u64, format_ms: u64) -> StageScript {
        StageScript::sync("raw", FormattedResult::default())
            .with_process_delay(Duration::from_millis(process_ms))
            .with_format_delay(Duration::from_millis(format_ms))
    }

    #[tokio::test]
    async fn test_all_required_succeed_optional_declined() {
        let h = harness(ScriptedStageClient::new(), ScriptedGate::declining(), OrchestratorConfig::new());

        let report = h.orchestrator.run(CONTEXT).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.active_stages, REQUIRED_STAGES.to_vec());
        assert_eq!(report.completed_stages, REQUIRED_STAGES.to_vec());
        assert_eq!(report.declined_stages, vec![Stage::Justification, Stage::Deck]);
        assert!(report.error.is_none());

        assert_eq!(h.gate.asked(), vec![Stage::Justification, Stage::Deck]);
        assert_eq!(h.client.calls()[0], ClientCall::SubmitContext(CONTEXT.to_string()));
        assert_eq!(h.client.processed_stages(), REQUIRED_STAGES.to_vec());
        assert!(!h.client.was_called(Stage::Justification));
        assert!(!h.client.was_called(Stage::Deck));

        assert_eq!(completed_order(&h.sink), REQUIRED_STAGES.to_vec());
        let snapshot = h.orchestrator.snapshot().unwrap();
        assert_eq!(snapshot.run_status, RunStatus::Completed);
        assert_eq!(snapshot.completed_count(), 5);
        assert!(snapshot.active_stages().is_empty());
    }

    #[tokio::test]
    async fn test_justification_accepted_deck_declined() {
        let h = harness(
            ScriptedStageClient::new(),
            ScriptedGate::accepting(&[Stage::Justification]),
            OrchestratorConfig::new(),
        );

        let report = h.orchestrator.run(CONTEXT).await.unwrap();

        let mut expected = REQUIRED_STAGES.to_vec();
        expected.push(Stage::Justification);
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.active_stages, expected);
        assert_eq!(report.completed_stages, expected);
        assert_eq!(report.declined_stages, vec![Stage::Deck]);
        assert_eq!(h.gate.asked(), vec![Stage::Justification, Stage::Deck]);
        assert!(!h.client.was_called(Stage::Deck));
        assert_eq!(
            report.result(Stage::Justification).unwrap().formatted,
            sample_formatted(Stage::Justification)
        );
    }

    #[tokio::test]
    async fn test_revenue_network_failure_fails_run() {
        let client = ScriptedStageClient::new().with_stage(
            Stage::Revenue,
            StageScript::process_error(AnalysisError::network("connection refused")),
        );
        let h = harness(client, ScriptedGate::declining(), OrchestratorConfig::new());

        let report = h.orchestrator.run(CONTEXT).await.unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.completed_stages, vec![Stage::Strategy, Stage::Competitors]);
        assert_eq!(report.failed_stages, vec![Stage::Revenue]);
        assert!(report.error.as_deref().unwrap().contains("revenue"));
        assert!(!h.client.was_called(Stage::Cost));
        assert!(!h.client.was_called(Stage::Roi));
        assert!(h.gate.asked().is_empty());

        let failures = h.sink.events_of_type("stage.failed");
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            &failures[0],
            RunEvent::StageFailed { stage: Stage::Revenue, kind: ErrorKind::Network, .. }
        ));
        assert!(matches!(
            h.sink.events().last(),
            Some(RunEvent::RunFinished { status: RunStatus::Failed, error: Some(_), .. })
        ));
    }

    #[tokio::test]
    async fn test_sync_result_is_backend_formatting_output() {
        let roi = FormattedResult::new(vec![Section {
            metrics: vec![Metric {
                label: "Payback".to_string(),
                value: "18".to_string(),
                unit: Some("months".to_string()),
            }],
            ..Section::new("ROI Analysis", "Positive after year two.")
        }])
        .with_recommendations(vec!["Start with one city".to_string()]);
        let client = ScriptedStageClient::new().with_stage(Stage::Roi, StageScript::sync("raw roi", roi.clone()));
        let h = harness(client, ScriptedGate::declining(), OrchestratorConfig::new());

        let report = h.orchestrator.run(CONTEXT).await.unwrap();

        let result = report.result(Stage::Roi).unwrap();
        assert_eq!(result.formatted, roi);
        assert_eq!(result.raw, Some(json!("raw roi")));
        assert!(h.client.calls().contains(&ClientCall::Format(Stage::Roi, json!("raw roi"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_stage_resolves_after_two_intervals() {
        let client = ScriptedStageClient::new()
            .with_stage(Stage::Cost, StageScript::polling(1, sample_formatted(Stage::Cost)));
        let h = harness(client, ScriptedGate::declining(), OrchestratorConfig::new());

        let start = Instant::now();
        let report = h.orchestrator.run(CONTEXT).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(h.client.poll_count(Stage::Cost), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert!(report.result(Stage::Cost).unwrap().raw.is_none());
        assert!(!h.client.calls().iter().any(|c| matches!(c, ClientCall::Format(Stage::Cost, _))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_timeout_fails_run() {
        let client = ScriptedStageClient::new()
            .with_stage(Stage::Roi, StageScript::polling(1_000, sample_formatted(Stage::Roi)));
        let config = OrchestratorConfig::new().with_polling(PollConfig::new(10, 30));
        let h = harness(client, ScriptedGate::declining(), config);

        let report = h.orchestrator.run(CONTEXT).await.unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.failed_stages, vec![Stage::Roi]);
        assert_eq!(h.client.poll_count(Stage::Roi), 30);
        assert!(report.error.unwrap().contains("timed out after 30 attempts"));
    }

    #[tokio::test]
    async fn test_poll_failure_is_stage_processing_error() {
        let client = ScriptedStageClient::new()
            .with_stage(Stage::Competitors, StageScript::poll_failure("agent crashed"));
        let config = OrchestratorConfig::new().with_polling(PollConfig::new(1, 30));
        let h = harness(client, ScriptedGate::declining(), config);

        let report = h.orchestrator.run(CONTEXT).await.unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.completed_stages, vec![Stage::Strategy]);
        assert_eq!(h.client.poll_count(Stage::Competitors), 1);
        assert!(matches!(
            h.sink.events_of_type("stage.failed").first(),
            Some(RunEvent::StageFailed { kind: ErrorKind::StageProcessing, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlap_dispatches_next_process_during_formatting() {
        let client = ScriptedStageClient::new().with_all(&delayed(100, 100));
        let h = harness(client, ScriptedGate::declining(), OrchestratorConfig::new());

        let start = Instant::now();
        let report = h.orchestrator.run(CONTEXT).await.unwrap();

        // Five process calls and five format calls, pairwise overlapped.
        assert_eq!(start.elapsed(), Duration::from_millis(600));
        assert_eq!(report.completed_stages, REQUIRED_STAGES.to_vec());
        assert_eq!(completed_order(&h.sink), REQUIRED_STAGES.to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlap_disabled_runs_serially() {
        let client = ScriptedStageClient::new().with_all(&delayed(100, 100));
        let config = OrchestratorConfig::new().with_overlap(false);
        let h = harness(client, ScriptedGate::declining(), config);

        let start = Instant::now();
        h.orchestrator.run(CONTEXT).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_payload_serializes_dependent_stages() {
        let client = ScriptedStageClient::new();
        let client = REQUIRED_STAGES.iter().fold(client, |client, &stage| {
            client.with_stage(
                stage,
                StageScript::sync("raw", sample_formatted(stage))
                    .with_process_delay(Duration::from_millis(100))
                    .with_format_delay(Duration::from_millis(100)),
            )
        });
        let config = OrchestratorConfig::new().with_payload_mode(PayloadMode::WithUpstream);
        let h = harness(client, ScriptedGate::declining(), config);

        let start = Instant::now();
        let report = h.orchestrator.run(CONTEXT).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        // Only competitors -> revenue is independent and may overlap.
        assert_eq!(start.elapsed(), Duration::from_millis(900));

        assert_eq!(h.client.payload_for(Stage::Strategy), Some(json!({ "upstream": {} })));
        let cost = h.client.payload_for(Stage::Cost).unwrap();
        assert_eq!(cost["upstream"]["strategy"]["sections"][0]["title"], "Strategy Analysis");
        assert_eq!(cost["upstream"]["revenue"]["sections"][0]["title"], "Revenue Analysis");
        assert!(cost["upstream"].get("competitors").is_none());
    }

    #[tokio::test]
    async fn test_progress_shows_overlapping_stages_active() {
        let h = harness(ScriptedStageClient::new(), ScriptedGate::declining(), OrchestratorConfig::new());

        h.orchestrator.run(CONTEXT).await.unwrap();

        let snapshots: Vec<_> = h
            .sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                RunEvent::Progress(snapshot) => Some(snapshot),
                _ => None,
            })
            .collect();

        assert_eq!(snapshots[0].run_status, RunStatus::Running);
        assert!(snapshots[0].active_stages().is_empty());
        assert_eq!(snapshots[1].active_stages(), vec![Stage::Strategy]);
        assert!(snapshots
            .iter()
            .any(|s| s.active_stages() == vec![Stage::Strategy, Stage::Competitors]));
        let last = snapshots.last().unwrap();
        assert_eq!(last.run_status, RunStatus::Completed);
        assert_eq!(last.completed_count(), 5);
    }

    #[tokio::test]
    async fn test_every_event_carries_run_id() {
        let h = harness(
            ScriptedStageClient::new(),
            ScriptedGate::accepting(&[Stage::Deck]),
            OrchestratorConfig::new(),
        );

        let report = h.orchestrator.run(CONTEXT).await.unwrap();

        assert!(!h.sink.is_empty());
        assert!(h.sink.events().iter().all(|e| e.run_id() == report.run_id));
        assert_eq!(h.sink.events_of_type("gate.").len(), 2);
    }

    #[tokio::test]
    async fn test_optional_failure_is_isolated() {
        let client = ScriptedStageClient::new()
            .with_stage(Stage::Justification, StageScript::format_error("template missing"));
        let h = harness(
            client,
            ScriptedGate::accepting(&[Stage::Justification, Stage::Deck]),
            OrchestratorConfig::new(),
        );

        let report = h.orchestrator.run(CONTEXT).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert!(report.error.is_none());
        assert_eq!(report.failed_stages, vec![Stage::Justification]);
        assert!(report.completed_stages.contains(&Stage::Deck));
        assert_eq!(
            h.orchestrator.snapshot().unwrap().status_of(Stage::Justification),
            Some(StageStatus::Failed)
        );
    }

    #[tokio::test]
    async fn test_empty_context_is_rejected_without_a_run() {
        let h = harness(ScriptedStageClient::new(), ScriptedGate::declining(), OrchestratorConfig::new());

        let err = h.orchestrator.run("   \n\t").await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput { .. }));
        assert!(h.orchestrator.start("").is_err());

        assert!(h.orchestrator.current_run_id().is_none());
        assert!(h.client.calls().is_empty());
        assert!(h.sink.is_empty());
    }

    #[tokio::test]
    async fn test_submit_context_failure_fails_run() {
        let client =
            ScriptedStageClient::new().with_submit_error(AnalysisError::network("connection refused"));
        let h = harness(client, ScriptedGate::declining(), OrchestratorConfig::new());

        let report = h.orchestrator.run(CONTEXT).await.unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        assert!(report.completed_stages.is_empty());
        assert!(h.client.processed_stages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_abandons_in_flight_run() {
        let client = ScriptedStageClient::new()
            .with_stage(Stage::Cost, delayed(10_000, 0));
        let h = harness(client, ScriptedGate::declining(), OrchestratorConfig::new());

        let handle = h.orchestrator.start(CONTEXT).unwrap();
        assert_eq!(h.orchestrator.current_run_id(), Some(handle.run_id()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            h.orchestrator.snapshot().unwrap().status_of(Stage::Cost),
            Some(StageStatus::Active)
        );

        assert!(h.orchestrator.cancel());
        assert!(!h.orchestrator.cancel());
        assert!(h.orchestrator.current_run_id().is_none());

        let report = handle.join().await.unwrap();
        assert_eq!(report.status, RunStatus::Cancelled);
        assert!(!report.completed_stages.contains(&Stage::Cost));
        assert!(!h.client.was_called(Stage::Roi));

        let finished = h.sink.events_of_type("run.finished");
        assert_eq!(finished.len(), 1);
        assert!(matches!(
            h.sink.events().last(),
            Some(RunEvent::RunFinished { status: RunStatus::Cancelled, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_run_supersedes_prior_run() {
        let client = ScriptedStageClient::new()
            .with_stage(Stage::Cost, delayed(10_000, 0));
        let h = harness(client, ScriptedGate::declining(), OrchestratorConfig::new());

        let first = h.orchestrator.start(CONTEXT).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let second = h.orchestrator.start("a meal kit delivery service").unwrap();
        assert_eq!(h.orchestrator.current_run_id(), Some(second.run_id()));

        let first_report = first.join().await.unwrap();
        assert_eq!(first_report.status, RunStatus::Cancelled);

        let second_report = second.join().await.unwrap();
        assert_eq!(second_report.status, RunStatus::Completed);

        let first_id = first_report.run_id;
        let events = h.sink.events();
        assert!(!events.iter().any(|e| {
            e.run_id() == first_id && matches!(e, RunEvent::RunFinished { .. })
        }));
        assert!(!events.iter().any(|e| matches!(
            e,
            RunEvent::StageCompleted { run_id, result } if *run_id == first_id && result.stage == Stage::Cost
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            RunEvent::RunFinished { run_id, status: RunStatus::Completed, .. } if *run_id == second_report.run_id
        )));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = OrchestratorConfig::new().with_polling(PollConfig::new(1000, 0));
        let result = StepOrchestrator::new(
            Arc::new(ScriptedStageClient::new()),
            Arc::new(ScriptedGate::declining()),
            config,
        );
        assert!(matches!(result, Err(AnalysisError::Config(_))));
    }

    #[test]
    fn test_unrepresentable_timeout_fails_from_config() {
        let config = OrchestratorConfig::from_json_str(r#"{"backend": {"request_timeout_seconds": 1e300}}"#);
        assert!(matches!(config, Err(AnalysisError::Config(_))));

        let mut config = OrchestratorConfig::new();
        config.backend.request_timeout_seconds = f64::INFINITY;
        let result = StepOrchestrator::from_config(config, Arc::new(ScriptedGate::declining()));
        assert!(matches!(result, Err(AnalysisError::Config(_))));
    }

    #[tokio::test]
    async fn test_channel_gate_drives_optional_phase() {
        let client = Arc::new(ScriptedStageClient::new());
        let (gate, mut requests) = ChannelGate::with_notifier();
        let gate = Arc::new(gate);
        let orchestrator = Arc::new(StepOrchestrator::new(
            client.clone(),
            gate.clone() as Arc<dyn OptionalStageGate>,
            OrchestratorConfig::new(),
        )
        .unwrap());

        let handle = orchestrator.start(CONTEXT).unwrap();

        let justification = requests.recv().await.unwrap();
        assert_eq!(justification.stage, Stage::Justification);
        assert!(gate.decline(justification.request_id));

        let deck = requests.recv().await.unwrap();
        assert_eq!(deck.stage, Stage::Deck);
        assert!(gate.accept(deck.request_id));

        let report = handle.join().await.unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.active_stages.last(), Some(&Stage::Deck));
        assert_eq!(report.declined_stages, vec![Stage::Justification]);
        assert!(!client.was_called(Stage::Justification));
    }
}
