mod common;

use std::{sync::Arc, time::Duration};

use client_common::prover::{BlockRange, ProverErrorKind};
use common::{ScriptedProver, buffer_with, orchestrator_config};
use rollup_prover::{
    errors::EngineError,
    host::BlockBuffer,
    jobs::{FailureReason, Orchestrator, OrchestratorBuilder, ProofOutcome, ProofResult},
};
use tokio::sync::mpsc;

fn orchestrator(
    prover: &Arc<ScriptedProver>,
    blocks: Arc<BlockBuffer>,
    batch_size: u64,
) -> (Orchestrator, mpsc::Receiver<ProofResult>) {
    OrchestratorBuilder::new(orchestrator_config(batch_size), prover.clone(), blocks)
        .into_orchestrator()
        .expect("valid orchestrator config")
}

fn range(from: u64, to: u64) -> BlockRange {
    BlockRange::new(from, to).unwrap()
}

async fn wait_until_idle(orchestrator: &Orchestrator) {
    for _ in 0..100 {
        if orchestrator.active_jobs().is_empty() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("jobs still in flight: {:?}", orchestrator.active_jobs());
}

#[tokio::test(start_paused = true)]
async fn submits_one_batch_per_boundary() {
    env_logger::try_init().ok();
    let prover = ScriptedProver::always("Executing");
    let (orchestrator, _results) = orchestrator(&prover, buffer_with(1..=25), 10);

    let mut submitted = Vec::new();
    for height in 1..=25 {
        if let Some(job) = orchestrator.on_block_finalized(height).await.unwrap() {
            submitted.push(job);
        }
    }

    assert_eq!(prover.submitted(), vec![range(1, 10), range(11, 20)]);
    assert_eq!(submitted.len(), 2);
    assert!(submitted.iter().all(|job| !job.already_in_flight));
    for job in &submitted {
        assert_eq!(job.range.len(), orchestrator.batch_size());
    }
    let active: Vec<BlockRange> = orchestrator
        .active_jobs()
        .into_iter()
        .map(|job| job.range)
        .collect();
    assert_eq!(active, vec![range(1, 10), range(11, 20)]);
}

#[tokio::test(start_paused = true)]
async fn stale_finalization_events_are_ignored() {
    let prover = ScriptedProver::always("Executing");
    let (orchestrator, _results) = orchestrator(&prover, buffer_with(1..=10), 10);

    assert!(orchestrator.on_block_finalized(10).await.unwrap().is_some());
    assert!(orchestrator.on_block_finalized(10).await.unwrap().is_none());
    assert!(orchestrator.on_block_finalized(7).await.unwrap().is_none());
    assert_eq!(prover.submitted().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn height_zero_never_triggers() {
    let prover = ScriptedProver::always("Executing");
    let (orchestrator, _results) = orchestrator(&prover, buffer_with(0..=1), 1);

    assert!(orchestrator.on_block_finalized(0).await.unwrap().is_none());
    assert!(orchestrator.on_block_finalized(1).await.unwrap().is_some());
    assert_eq!(prover.submitted(), vec![range(1, 1)]);
}

#[tokio::test(start_paused = true)]
async fn in_flight_range_is_not_submitted_twice() {
    let prover = ScriptedProver::always("Executing");
    let (orchestrator, _results) = orchestrator(&prover, buffer_with(1..=10), 10);

    let first = orchestrator.on_block_finalized(10).await.unwrap().unwrap();
    let again = orchestrator.replay(range(1, 10)).await.unwrap();

    assert_eq!(again.job_id, first.job_id);
    assert!(again.already_in_flight);
    assert_eq!(prover.submitted().len(), 1);
    assert_eq!(orchestrator.active_jobs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_submission_is_skipped_and_can_be_replayed() {
    let prover = ScriptedProver::always("Executing");
    let (orchestrator, _results) = orchestrator(&prover, buffer_with(1..=20), 10);

    prover.reject_submissions(true);
    let err = orchestrator.on_block_finalized(10).await.unwrap_err();
    match err {
        EngineError::Submission { range: failed, source } => {
            assert_eq!(failed, range(1, 10));
            assert_eq!(source.kind(), ProverErrorKind::Submission);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(orchestrator.active_jobs().is_empty());

    prover.reject_submissions(false);
    assert!(orchestrator.on_block_finalized(20).await.unwrap().is_some());
    let replayed = orchestrator.replay(range(1, 10)).await.unwrap();
    assert!(!replayed.already_in_flight);
    assert_eq!(prover.submitted(), vec![range(11, 20), range(1, 10)]);
}

#[tokio::test(start_paused = true)]
async fn replay_requires_a_whole_batch() {
    let prover = ScriptedProver::always("Executing");
    let (orchestrator, _results) = orchestrator(&prover, buffer_with(1..=20), 10);

    for bad in [range(5, 14), range(1, 5), range(1, 20), range(0, u64::MAX)] {
        let err = orchestrator.replay(bad).await.unwrap_err();
        assert!(
            matches!(err, EngineError::UnalignedRange { batch_size: 10, .. }),
            "{bad} gave {err:?}"
        );
    }
    assert!(prover.submitted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_replay_does_not_hold_up_finalization() {
    let prover = ScriptedProver::always("Executing");
    prover.delay_submission(range(1, 10), Duration::from_secs(60));
    let (orchestrator, _results) = orchestrator(&prover, buffer_with(1..=20), 10);
    let orchestrator = Arc::new(orchestrator);

    let replaying = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.replay(range(1, 10)).await }
    });
    tokio::task::yield_now().await;

    let finalized = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.on_block_finalized(20),
    )
    .await
    .expect("finalization is not blocked by the replay")
    .unwrap()
    .expect("batch 11..=20 submitted");
    assert_eq!(finalized.range, range(11, 20));

    assert!(matches!(
        orchestrator.replay(range(1, 10)).await,
        Err(EngineError::SubmissionInProgress { .. })
    ));

    let replayed = replaying.await.expect("replay task").unwrap();
    assert!(!replayed.already_in_flight);
    assert_eq!(prover.submitted(), vec![range(11, 20), range(1, 10)]);

    let again = orchestrator.replay(range(1, 10)).await.unwrap();
    assert!(again.already_in_flight);
    assert_eq!(again.job_id, replayed.job_id);
}

#[tokio::test(start_paused = true)]
async fn missing_blocks_skip_the_batch() {
    let prover = ScriptedProver::always("Executing");
    let (orchestrator, _results) = orchestrator(&prover, buffer_with(1..=8), 10);

    let err = orchestrator.on_block_finalized(10).await.unwrap_err();
    assert!(matches!(err, EngineError::BlockFetch { .. }));
    assert!(prover.submitted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn delivered_jobs_leave_the_registry() {
    let prover = ScriptedProver::always("Succeeded");
    let (orchestrator, mut results) = orchestrator(&prover, buffer_with(1..=10), 10);

    let job = orchestrator.on_block_finalized(10).await.unwrap().unwrap();
    let result = results.recv().await.expect("result delivered");
    assert_eq!(result.job_id, job.job_id);
    assert!(result.outcome.is_success());

    wait_until_idle(&orchestrator).await;
    assert!(!orchestrator.cancel(&job.job_id));
    assert_eq!(prover.cancel_calls(), 0);
    assert!(
        tokio::time::timeout(Duration::from_secs(30), results.recv())
            .await
            .is_err()
    );
}

#[tokio::test(start_paused = true)]
async fn cancel_fails_the_job_locally() {
    let prover = ScriptedProver::always("Executing");
    let (orchestrator, mut results) = orchestrator(&prover, buffer_with(1..=10), 10);

    let job = orchestrator.on_block_finalized(10).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(orchestrator.cancel(&job.job_id));

    let result = results.recv().await.expect("result delivered");
    assert_eq!(
        result.outcome,
        ProofOutcome::Failed(FailureReason::Cancelled)
    );
    assert_eq!(prover.cancel_calls(), 1);
    wait_until_idle(&orchestrator).await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_trackers_and_submissions() {
    let prover = ScriptedProver::always("Executing");
    let (orchestrator, mut results) = orchestrator(&prover, buffer_with(1..=20), 10);

    orchestrator.on_block_finalized(10).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    orchestrator.shutdown();

    wait_until_idle(&orchestrator).await;
    let calls = prover.status_calls();
    assert!(
        tokio::time::timeout(Duration::from_secs(120), results.recv())
            .await
            .is_err()
    );
    assert_eq!(prover.status_calls(), calls);
    assert!(matches!(
        orchestrator.on_block_finalized(20).await,
        Err(EngineError::ShuttingDown)
    ));
}

#[tokio::test]
async fn zero_batch_size_is_rejected() {
    let prover = ScriptedProver::always("Executing");
    let result = OrchestratorBuilder::new(orchestrator_config(0), prover, buffer_with(1..=1))
        .into_orchestrator();
    assert!(matches!(result, Err(EngineError::Config(_))));
}
