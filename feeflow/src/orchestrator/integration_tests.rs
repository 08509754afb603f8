//! End-to-end orchestration tests with real child processes.

#[cfg(all(test, unix))]
mod tests {
    use crate::core::{RunStatus, SkipReason};
    use crate::errors::FeeflowError;
    use crate::events::OrchestratorEvent;
    use crate::job::{ByteSize, RestartDecision, RestartPolicy, COLLECT_FEES, DISTRIBUTE, SWAP_TOKENS};
    use crate::logging::StatusLine;
    use crate::orchestrator::TickOutcome;
    use crate::shutdown::ShutdownToken;
    use crate::supervisor::NullProbe;
    use crate::testing::{
        assert_ran_with_status, assert_skipped, fast_settings, read_status_lines, script_job,
        FixedProbe, TestPipeline,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    fn revenue(dir: &std::path::Path, collect: &str, swap: &str, distribute: &str) -> TestPipeline {
        TestPipeline::new(dir)
            .script(COLLECT_FEES, collect)
            .gated_script(SWAP_TOKENS, swap, COLLECT_FEES)
            .gated_script(DISTRIBUTE, distribute, SWAP_TOKENS)
    }

    fn run_lines(lines: &[StatusLine]) -> usize {
        lines.iter().filter(|l| matches!(l, StatusLine::Run(_))).count()
    }

    #[tokio::test]
    async fn test_failed_distribute_does_not_touch_upstream_health() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = revenue(dir.path(), "echo collected", "echo swapped", "echo nope >&2; exit 1");
        let (orch, _events) = pipeline.build(Arc::new(NullProbe)).await.unwrap();

        let collect = orch.tick(COLLECT_FEES).await.unwrap();
        assert_ran_with_status(&collect, RunStatus::Succeeded);
        let swap = orch.tick(SWAP_TOKENS).await.unwrap();
        assert_ran_with_status(&swap, RunStatus::Succeeded);
        let distribute = orch.tick(DISTRIBUTE).await.unwrap();
        assert_eq!(assert_ran_with_status(&distribute, RunStatus::Failed).exit_code(), Some(1));

        let health = orch.coordinator().health();
        assert_eq!(health.status(COLLECT_FEES), Some(RunStatus::Succeeded));
        assert_eq!(health.status(SWAP_TOKENS), Some(RunStatus::Succeeded));
        assert_eq!(health.status(DISTRIBUTE), Some(RunStatus::Failed));

        // The next distribute tick is still attempted.
        let again = orch.tick(DISTRIBUTE).await.unwrap();
        assert_ran_with_status(&again, RunStatus::Failed);

        let lines = read_status_lines(&pipeline.log_dir().join("distribute-status.log"));
        assert_eq!(run_lines(&lines), 2);

        let err = std::fs::read_to_string(pipeline.log_dir().join("distribute-error.log")).unwrap();
        assert!(err.contains(": nope"));
    }

    #[tokio::test]
    async fn test_failed_collect_blocks_swap_until_it_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("collect-ok");
        let collect = format!("test -f {}", marker.display());
        let pipeline = revenue(dir.path(), &collect, "echo swapped", "echo distributed");
        let (orch, _events) = pipeline.build(Arc::new(NullProbe)).await.unwrap();

        assert_ran_with_status(&orch.tick(COLLECT_FEES).await.unwrap(), RunStatus::Failed);

        let blocked = orch.tick(SWAP_TOKENS).await.unwrap();
        assert_skipped(
            &blocked,
            &SkipReason::UpstreamUnhealthy {
                upstream: COLLECT_FEES.to_string(),
                status: RunStatus::Failed,
            },
        );
        assert!(orch.coordinator().health().status(SWAP_TOKENS).is_none());

        std::fs::write(&marker, b"").unwrap();
        assert_ran_with_status(&orch.tick(COLLECT_FEES).await.unwrap(), RunStatus::Succeeded);
        assert_ran_with_status(&orch.tick(SWAP_TOKENS).await.unwrap(), RunStatus::Succeeded);

        let lines = read_status_lines(&pipeline.log_dir().join("swap-tokens-status.log"));
        assert!(matches!(lines[0], StatusLine::Skip(_)));
        assert!(matches!(lines[1], StatusLine::Run(_)));
        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn test_downstream_waits_for_first_upstream_run() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = revenue(dir.path(), "true", "true", "true");
        let (orch, _events) = pipeline.build(Arc::new(NullProbe)).await.unwrap();

        let outcome = orch.tick(DISTRIBUTE).await.unwrap();
        assert_skipped(
            &outcome,
            &SkipReason::UpstreamNeverRan {
                upstream: SWAP_TOKENS.to_string(),
            },
        );
    }

    #[tokio::test]
    async fn test_gate_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let settings = crate::config::Settings {
            gate_on_upstream: false,
            ..fast_settings()
        };
        let pipeline = revenue(dir.path(), "exit 3", "true", "true").with_settings(settings);
        let (orch, _events) = pipeline.build(Arc::new(NullProbe)).await.unwrap();

        assert_ran_with_status(&orch.tick(COLLECT_FEES).await.unwrap(), RunStatus::Failed);
        assert_ran_with_status(&orch.tick(SWAP_TOKENS).await.unwrap(), RunStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = TestPipeline::new(dir.path()).script(COLLECT_FEES, "sleep 1");
        let (orch, _events) = pipeline.build(Arc::new(NullProbe)).await.unwrap();

        let first = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.tick(COLLECT_FEES).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(orch.lock().is_held(COLLECT_FEES));

        let second = orch.tick(COLLECT_FEES).await.unwrap();
        assert_skipped(&second, &SkipReason::Overlap);

        let first = first.await.unwrap().unwrap();
        assert_ran_with_status(&first, RunStatus::Succeeded);
        assert!(!orch.lock().is_held(COLLECT_FEES));

        let lines = read_status_lines(&pipeline.log_dir().join("collect-fees-status.log"));
        assert_eq!(run_lines(&lines), 1);
        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn test_forced_run_bypasses_gate_not_lock() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = revenue(dir.path(), "true", "sleep 1", "true");
        let (orch, _events) = pipeline.build(Arc::new(NullProbe)).await.unwrap();

        let forced = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.run_now(SWAP_TOKENS, true).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;

        let overlapped = orch.run_now(SWAP_TOKENS, true).await.unwrap();
        assert_skipped(&overlapped, &SkipReason::Overlap);

        let forced = forced.await.unwrap().unwrap();
        assert_ran_with_status(&forced, RunStatus::Succeeded);
        assert!(orch.coordinator().health().status(COLLECT_FEES).is_none());
    }

    #[tokio::test]
    async fn test_unknown_job_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = TestPipeline::new(dir.path()).script(COLLECT_FEES, "true");
        let (orch, _events) = pipeline.build(Arc::new(NullProbe)).await.unwrap();

        let err = orch.tick("claim-rewards").await.unwrap_err();
        assert!(matches!(err, FeeflowError::UnknownJob(ref id) if id == "claim-rewards"));
    }

    #[tokio::test]
    async fn test_memory_kill_is_unhealthy_for_downstream() {
        let dir = tempfile::tempdir().unwrap();
        let collect = script_job(COLLECT_FEES, "sleep 30", dir.path())
            .with_memory_limit(ByteSize::from_mib(500));
        let pipeline = TestPipeline::new(dir.path())
            .job(collect)
            .gated_script(SWAP_TOKENS, "true", COLLECT_FEES);
        let probe = Arc::new(FixedProbe(ByteSize::from_mib(501).bytes()));
        let (orch, _events) = pipeline.build(probe).await.unwrap();

        let killed = tokio::time::timeout(Duration::from_secs(10), orch.tick(COLLECT_FEES))
            .await
            .expect("memory kill should be prompt")
            .unwrap();
        assert_ran_with_status(&killed, RunStatus::KilledMemory);

        assert_skipped(
            &orch.tick(SWAP_TOKENS).await.unwrap(),
            &SkipReason::UpstreamUnhealthy {
                upstream: COLLECT_FEES.to_string(),
                status: RunStatus::KilledMemory,
            },
        );
    }

    #[tokio::test]
    async fn test_events_follow_run_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = revenue(dir.path(), "true", "true", "true");
        let (orch, events) = pipeline.build(Arc::new(NullProbe)).await.unwrap();

        orch.tick(COLLECT_FEES).await.unwrap();
        orch.tick(DISTRIBUTE).await.unwrap();

        let types: Vec<&str> = events.events().iter().map(OrchestratorEvent::event_type).collect();
        assert_eq!(types, vec!["run.started", "run.completed", "tick.skipped"]);
    }

    #[tokio::test]
    async fn test_never_policy_retires_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let job = script_job(DISTRIBUTE, "exit 2", dir.path())
            .with_restart_policy(RestartPolicy::Never);
        let pipeline = TestPipeline::new(dir.path()).job(job);
        let (orch, events) = pipeline.build(Arc::new(NullProbe)).await.unwrap();

        let outcome = orch.tick(DISTRIBUTE).await.unwrap();
        assert!(matches!(
            outcome,
            TickOutcome::Ran {
                decision: RestartDecision::Retire,
                ..
            }
        ));

        // Scheduled, the loop stops by itself once the job retires.
        tokio::time::timeout(Duration::from_secs(10), Arc::clone(&orch).run_until(ShutdownToken::new()))
            .await
            .expect("retired job loop should stop");

        assert_eq!(events.events_of_type("job.retired").len(), 1);
        let lines = read_status_lines(&pipeline.log_dir().join("distribute-status.log"));
        assert_eq!(run_lines(&lines), 2);
    }

    #[tokio::test]
    async fn test_run_until_fires_and_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = TestPipeline::new(dir.path()).script(COLLECT_FEES, "echo tick");
        let (orch, _events) = pipeline.build(Arc::new(NullProbe)).await.unwrap();

        let shutdown = ShutdownToken::new();
        let handle = tokio::spawn(Arc::clone(&orch).run_until(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        shutdown.trigger("test");
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loops should stop after shutdown")
            .unwrap();

        let lines = read_status_lines(&pipeline.log_dir().join("collect-fees-status.log"));
        assert!(run_lines(&lines) >= 1, "expected at least one run, got {lines:?}");
        let out = std::fs::read_to_string(pipeline.log_dir().join("collect-fees-out.log")).unwrap();
        assert!(out.contains(": tick"));
    }

    #[tokio::test]
    async fn test_shutdown_grace_abandons_long_runs() {
        let dir = tempfile::tempdir().unwrap();
        let settings = crate::config::Settings {
            shutdown_grace: Duration::from_millis(200),
            ..fast_settings()
        };
        let pipeline = TestPipeline::new(dir.path())
            .with_settings(settings)
            .script(COLLECT_FEES, "sleep 30");
        let (orch, _events) = pipeline.build(Arc::new(NullProbe)).await.unwrap();

        let shutdown = ShutdownToken::new();
        let handle = tokio::spawn(Arc::clone(&orch).run_until(shutdown.clone()));

        // Wait for the first fire to take the lock.
        tokio::time::timeout(Duration::from_secs(5), async {
            while !orch.lock().is_held(COLLECT_FEES) {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("first fire should start a run");

        shutdown.trigger("test");
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("grace should bound shutdown")
            .unwrap();
        assert!(!orch.lock().is_held(COLLECT_FEES));
        assert_eq!(orch.lock().held_count(), 0);

        let lines = read_status_lines(&pipeline.log_dir().join("collect-fees-status.log"));
        let runs: Vec<_> = lines
            .iter()
            .filter_map(|line| match line {
                StatusLine::Run(record) => Some(record),
                StatusLine::Skip(_) => None,
            })
            .collect();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status(), RunStatus::Failed);
        assert_eq!(runs[0].failure_reason(), Some("orchestrator shutdown"));
        assert!(runs[0].ended_at().is_some());
        assert_eq!(
            orch.coordinator().health().status(COLLECT_FEES),
            Some(RunStatus::Failed)
        );
    }
}
