#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use queue_core::{Job, JobResult, JobState};
use serde_json::Map;

use db::repositories::{
    CatalogRepository, JobRepository, SubjectRecord, UnitRecord, UnitSummaryRecord,
};

fn job(queue: &str, subject: &str, seq: u64) -> Job {
    // Offset creation time by seq so derived ids stay distinct.
    let at = Utc::now() + TimeDelta::milliseconds(seq as i64);
    Job::new(queue, subject, Map::new(), seq, at)
}

fn finished(mut job: Job, state: JobState, finished_ago: TimeDelta) -> Job {
    let now = Utc::now();
    job.state = state;
    job.processed_at = Some(now - finished_ago);
    job.finished_at = Some(now - finished_ago);
    match state {
        JobState::Completed => job.result = Some(JobResult::new("done")),
        JobState::Failed => job.failure_reason = Some("boom".to_string()),
        _ => {}
    }
    job
}

#[tokio::test]
async fn test_job_round_trip() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;
    let repo = JobRepository::new(db);

    let created = repo.insert(&job("synthesis", "p1", 1)).await?;
    assert_eq!(created.state, JobState::Waiting);
    assert_eq!(created.payload_str("subject_id"), Some("p1"));

    let loaded = repo.get(&created.id).await?.expect("job stored");
    assert_eq!(loaded.id, created.id);
    assert_eq!(loaded.seq, 1);
    assert_eq!(
        loaded.created_at.timestamp_millis(),
        created.created_at.timestamp_millis()
    );

    let mut active = loaded.clone();
    active.state = JobState::Active;
    active.progress = 40;
    active.processed_at = Some(Utc::now());
    let saved = repo.save(&active).await?;
    assert_eq!(saved.state, JobState::Active);
    assert_eq!(saved.progress, 40);

    let in_flight = repo.find_in_flight("synthesis", "p1").await?;
    assert_eq!(in_flight.map(|j| j.id), Some(created.id.clone()));
    assert!(repo.find_in_flight("synthesis", "p2").await?.is_none());
    assert!(repo.find_in_flight("derivation", "p1").await?.is_none());

    repo.delete(&created.id).await?;
    assert!(repo.get(&created.id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_waiting_jobs_come_out_in_submission_order() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;
    let repo = JobRepository::new(db);

    repo.insert(&job("q", "c", 3)).await?;
    repo.insert(&job("q", "a", 1)).await?;
    repo.insert(&job("q", "b", 2)).await?;
    repo.insert(&job("other", "z", 0)).await?;

    let first = repo.next_waiting("q").await?.expect("waiting job");
    assert_eq!(first.subject_id, "a");

    let all = repo.list_in_state("q", JobState::Waiting).await?;
    let subjects: Vec<_> = all.iter().map(|j| j.subject_id.as_str()).collect();
    assert_eq!(subjects, ["a", "b", "c"]);

    assert_eq!(repo.max_seq("q").await?, 3);
    assert_eq!(repo.max_seq("empty").await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_counts_and_terminal_lookups() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;
    let repo = JobRepository::new(db);

    repo.insert(&job("q", "w", 1)).await?;
    repo.insert(&finished(job("q", "done", 2), JobState::Completed, TimeDelta::zero()))
        .await?;
    repo.insert(&finished(job("q", "bad", 3), JobState::Failed, TimeDelta::zero()))
        .await?;
    let delayed = job("q", "later", 4).delayed_until(Utc::now() - TimeDelta::seconds(1));
    repo.insert(&delayed).await?;

    let counts = repo.count_by_state("q").await?;
    assert_eq!(counts.get(&JobState::Waiting).copied(), Some(1));
    assert_eq!(counts.get(&JobState::Completed).copied(), Some(1));
    assert_eq!(counts.get(&JobState::Failed).copied(), Some(1));
    assert_eq!(counts.get(&JobState::Delayed).copied(), Some(1));
    assert_eq!(counts.get(&JobState::Active), None);

    let completed = repo
        .latest_finished("q", "done", JobState::Completed)
        .await?
        .expect("completed job");
    assert_eq!(completed.result, Some(JobResult::new("done")));
    assert!(repo.latest_finished("q", "done", JobState::Failed).await?.is_none());

    let failed = repo
        .latest_finished("q", "bad", JobState::Failed)
        .await?
        .expect("failed job");
    assert_eq!(failed.failure_reason.as_deref(), Some("boom"));

    let due = repo.due_delayed("q", Utc::now()).await?;
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].subject_id, "later");

    Ok(())
}

#[tokio::test]
async fn test_prune_keeps_newest_and_drops_expired() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;
    let repo = JobRepository::new(db);

    for seq in 1..=4 {
        let ago = TimeDelta::seconds(10 - seq as i64);
        repo.insert(&finished(job("q", &format!("s{seq}"), seq), JobState::Completed, ago))
            .await?;
    }
    let old = finished(job("q", "ancient", 9), JobState::Failed, TimeDelta::hours(2));
    repo.insert(&old).await?;

    let removed = repo
        .prune("q", JobState::Completed, Duration::from_secs(3600), 2, Utc::now())
        .await?;
    assert_eq!(removed, 2);

    let kept = repo.list_in_state("q", JobState::Completed).await?;
    let subjects: Vec<_> = kept.iter().map(|j| j.subject_id.as_str()).collect();
    assert_eq!(subjects, ["s3", "s4"]);

    let removed = repo
        .prune("q", JobState::Failed, Duration::from_secs(3600), 10, Utc::now())
        .await?;
    assert_eq!(removed, 1);
    assert!(repo.get(&old.id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_catalog_round_trip() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;
    let catalog = CatalogRepository::new(db);

    catalog
        .put_subject(&SubjectRecord {
            subject_id: "p1".into(),
            name: "Harbor".into(),
            description: "A harbor survey".into(),
        })
        .await?;
    for (id, title) in [("u2", "Tides"), ("u1", "Docks")] {
        catalog
            .put_unit(&UnitRecord {
                unit_id: id.into(),
                subject_id: "p1".into(),
                title: title.into(),
                body: String::new(),
            })
            .await?;
    }

    let subject = catalog.get_subject("p1").await?.expect("subject");
    assert_eq!(subject.name, "Harbor");
    assert!(catalog.get_subject("missing").await?.is_none());

    let units = catalog.units_for("p1").await?;
    let ids: Vec<_> = units.iter().map(|u| u.unit_id.as_str()).collect();
    assert_eq!(ids, ["u1", "u2"]);

    assert!(catalog.get_summary("u1").await?.is_none());
    catalog
        .put_summary(&UnitSummaryRecord {
            unit_id: "u1".into(),
            facts: vec!["docks are long".into()],
            updated_at_ms: Utc::now().timestamp_millis(),
        })
        .await?;
    let summary = catalog.get_summary("u1").await?.expect("summary");
    assert_eq!(summary.facts, ["docks are long"]);

    Ok(())
}
