#![allow(clippy::disallowed_methods)]

mod common;

use std::time::Duration;

use common::{FlakySummaries, StaticResolver, TestResult, fast_config, harness};
use queue_core::{EnqueueOptions, JobEvent, QueueError};

const WAIT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn test_failed_units_are_tolerated() -> TestResult {
    let resolver = StaticResolver::default().with_subject("p1", 5);
    let summaries = FlakySummaries::failing(&["p1-u2", "p1-u4"]);
    let h = harness(resolver, summaries, fast_config(), true).await?;

    let job = h.synthesis.enqueue("p1", EnqueueOptions::default()).await?;
    let result = h.synthesis.wait_for(&job.id, WAIT).await?;

    let output = result.output.as_ref().expect("structured output");
    assert_eq!(output["units_total"], 5);
    assert_eq!(output["units_succeeded"], 3);
    assert_eq!(output["units_failed"], serde_json::json!(["p1-u2", "p1-u4"]));
    // Three unique facts plus the shared one.
    assert_eq!(output["facts"], 4);
    assert!(result.output_str("url").is_some_and(|u| u.ends_with(".md")));

    // Every failing unit got its full retry budget, healthy ones one call.
    assert_eq!(h.summaries.attempts("p1-u2"), 3);
    assert_eq!(h.summaries.attempts("p1-u4"), 3);
    assert_eq!(h.summaries.attempts("p1-u1"), 1);
    assert_eq!(h.artifacts.count(), 1);

    h.system.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_synthesis_fails_when_no_unit_succeeds() -> TestResult {
    let resolver = StaticResolver::default().with_subject("p1", 2);
    let summaries = FlakySummaries::failing(&["p1-u1", "p1-u2"]);
    let h = harness(resolver, summaries, fast_config(), true).await?;

    let job = h.synthesis.enqueue("p1", EnqueueOptions::default()).await?;
    match h.synthesis.wait_for(&job.id, WAIT).await {
        Err(QueueError::JobFailed { reason, .. }) => {
            assert!(reason.contains("none of the 2 units"), "{reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }

    // Nothing was stored for a failed job.
    assert_eq!(h.artifacts.count(), 0);
    let status = h.synthesis.status_for("p1").await?;
    assert!(status.result.is_none());

    h.system.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_subject_without_units_still_synthesizes() -> TestResult {
    let resolver = StaticResolver::default().with_subject("p1", 0);
    let h = harness(resolver, FlakySummaries::default(), fast_config(), true).await?;

    let job = h.synthesis.enqueue("p1", EnqueueOptions::default()).await?;
    let result = h.synthesis.wait_for(&job.id, WAIT).await?;
    assert_eq!(result.output.as_ref().map(|o| o["facts"].clone()), Some(0.into()));

    h.system.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_synthesis_progress_checkpoints() -> TestResult {
    let resolver = StaticResolver::default().with_subject("p1", 2);
    let h = harness(resolver, FlakySummaries::default(), fast_config(), true).await?;
    let mut events = h.system.subscribe();

    let job = h.synthesis.enqueue("p1", EnqueueOptions::default()).await?;
    h.synthesis.wait_for(&job.id, WAIT).await?;

    let mut recorded = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let JobEvent::JobProgress {
            job_id, progress, ..
        } = event
            && job_id == job.id
        {
            recorded.push(progress);
        }
    }

    assert_eq!(recorded, vec![10, 20, 45, 70, 75, 80, 90, 100]);

    h.system.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_derivation_uses_synthesis_result() -> TestResult {
    let resolver = StaticResolver::default().with_subject("p1", 3);
    let h = harness(resolver, FlakySummaries::default(), fast_config(), true).await?;

    let job = h.derivation.enqueue("p1", EnqueueOptions::default()).await?;
    let result = h.derivation.wait_for(&job.id, WAIT).await?;

    let dependency = result.output_str("dependency").expect("dependency recorded");
    let synthesis = h
        .synthesis
        .fetch(&dependency.into())
        .await?
        .expect("synthesis kept");
    let synthesis_url = synthesis
        .result
        .as_ref()
        .and_then(|r| r.output_str("url"))
        .expect("synthesis url");

    assert_eq!(result.output_str("source_url"), Some(synthesis_url));
    assert_eq!(synthesis.payload_str("requested_by"), Some(job.id.as_str()));
    assert_eq!(h.artifacts.count(), 2);

    h.system.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_dependency_failure_fails_derivation_fast() -> TestResult {
    let resolver = StaticResolver::default().with_subject("p1", 1);
    let summaries = FlakySummaries::failing(&["p1-u1"]);
    // Default 30 minute dependency cap.
    let h = harness(resolver, summaries, fast_config(), true).await?;

    let started = tokio::time::Instant::now();
    let job = h.derivation.enqueue("p1", EnqueueOptions::default()).await?;
    let reason = match h.derivation.wait_for(&job.id, WAIT).await {
        Err(QueueError::JobFailed { reason, .. }) => reason,
        other => panic!("expected failure, got {other:?}"),
    };
    assert!(started.elapsed() < Duration::from_secs(5));

    let synthesis = h.synthesis.status_for("p1").await?;
    let dependency = synthesis.job_id.expect("synthesis job recorded");
    assert!(reason.contains(dependency.as_str()), "{reason}");
    assert!(reason.contains("none of the 1 units"), "{reason}");

    h.system.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_dependency_conflict_fails_derivation() -> TestResult {
    let resolver = StaticResolver::default().with_subject("p1", 1);
    // No synthesis processor: the first synthesis job stays waiting.
    let h = harness(resolver, FlakySummaries::default(), fast_config(), false).await?;

    let blocking = h.synthesis.enqueue("p1", EnqueueOptions::default()).await?;
    let job = h.derivation.enqueue("p1", EnqueueOptions::default()).await?;

    match h.derivation.wait_for(&job.id, WAIT).await {
        Err(QueueError::JobFailed { reason, .. }) => {
            assert!(reason.starts_with("dependency conflict"), "{reason}");
            assert!(reason.contains(blocking.id.as_str()), "{reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }

    h.system.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_unknown_subject_fails_with_not_found() -> TestResult {
    let h = harness(
        StaticResolver::default(),
        FlakySummaries::default(),
        fast_config(),
        true,
    )
    .await?;

    let job = h.synthesis.enqueue("ghost", EnqueueOptions::default()).await?;
    match h.synthesis.wait_for(&job.id, WAIT).await {
        Err(QueueError::JobFailed { reason, .. }) => {
            assert_eq!(reason, "not found: subject ghost");
        }
        other => panic!("expected failure, got {other:?}"),
    }

    h.system.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_derivation_progress_checkpoints() -> TestResult {
    let resolver = StaticResolver::default().with_subject("p1", 2);
    let h = harness(resolver, FlakySummaries::default(), fast_config(), true).await?;
    let mut events = h.system.subscribe();

    let job = h.derivation.enqueue("p1", EnqueueOptions::default()).await?;
    h.derivation.wait_for(&job.id, WAIT).await?;

    let mut recorded = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let JobEvent::JobProgress {
            job_id, progress, ..
        } = event
            && job_id == job.id
        {
            recorded.push(progress);
        }
    }

    assert_eq!(recorded, vec![10, 20, 60, 90, 100]);

    h.system.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_dependency_timeout_fails_derivation() -> TestResult {
    let resolver = StaticResolver::default().with_subject("p1", 1);
    let config = fast_config().with_dependency_timeout(Duration::from_millis(100));
    // Without a synthesis processor the dependency never finishes.
    let h = harness(resolver, FlakySummaries::default(), config, false).await?;

    let job = h.derivation.enqueue("p1", EnqueueOptions::default()).await?;
    let reason = match h.derivation.wait_for(&job.id, WAIT).await {
        Err(QueueError::JobFailed { reason, .. }) => reason,
        other => panic!("expected failure, got {other:?}"),
    };

    let synthesis = h.synthesis.status_for("p1").await?;
    let dependency = synthesis.job_id.expect("synthesis job recorded");
    assert!(reason.contains(dependency.as_str()), "{reason}");
    assert!(reason.contains("did not finish within 100ms"), "{reason}");
    assert_eq!(h.artifacts.count(), 0);

    h.system.stop().await;
    Ok(())
}
