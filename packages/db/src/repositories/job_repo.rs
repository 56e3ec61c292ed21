//! Job repository: the durable store behind every queue.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use queue_core::{Job, JobId, JobResult, JobState};
use serde::{Deserialize, Serialize};

use crate::{Database, DbError};

const TABLE: &str = "job";

/// Repository for job persistence operations.
#[derive(Clone)]
pub struct JobRepository {
    db: Database,
}

/// Internal record type for SurrealDB.
///
/// The record key is the job id; `job_id` is duplicated as a plain field so
/// queries never have to unpack record ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobRecord {
    job_id: String,
    queue: String,
    job_type: String,
    subject_id: String,
    payload: serde_json::Value,
    state: String,
    progress: u8,
    seq: u64,
    created_at_ms: i64,
    #[serde(default)]
    run_at_ms: Option<i64>,
    #[serde(default)]
    processed_at_ms: Option<i64>,
    #[serde(default)]
    finished_at_ms: Option<i64>,
    #[serde(default)]
    result: Option<JobResult>,
    #[serde(default)]
    failure_reason: Option<String>,
}

impl JobRecord {
    fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            queue: job.queue.clone(),
            job_type: job.job_type.clone(),
            subject_id: job.subject_id.clone(),
            payload: job.payload.clone(),
            state: job.state.as_str().to_string(),
            progress: job.progress,
            seq: job.seq,
            created_at_ms: job.created_at.timestamp_millis(),
            run_at_ms: job.run_at.map(|t| t.timestamp_millis()),
            processed_at_ms: job.processed_at.map(|t| t.timestamp_millis()),
            finished_at_ms: job.finished_at.map(|t| t.timestamp_millis()),
            result: job.result.clone(),
            failure_reason: job.failure_reason.clone(),
        }
    }

    fn into_job(self) -> Result<Job, DbError> {
        let state = self
            .state
            .parse::<JobState>()
            .map_err(DbError::Serialization)?;
        let created_at = from_millis(self.created_at_ms).ok_or_else(|| {
            DbError::Serialization(format!("invalid created_at for job {}", self.job_id))
        })?;

        Ok(Job {
            id: JobId(self.job_id),
            queue: self.queue,
            job_type: self.job_type,
            subject_id: self.subject_id,
            payload: self.payload,
            state,
            progress: self.progress,
            seq: self.seq,
            created_at,
            run_at: self.run_at_ms.and_then(from_millis),
            processed_at: self.processed_at_ms.and_then(from_millis),
            finished_at: self.finished_at_ms.and_then(from_millis),
            result: self.result,
            failure_reason: self.failure_reason,
        })
    }
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

fn into_jobs(records: Vec<JobRecord>) -> Result<Vec<Job>, DbError> {
    records.into_iter().map(JobRecord::into_job).collect()
}

fn first_job(records: Vec<JobRecord>) -> Result<Option<Job>, DbError> {
    records.into_iter().next().map(JobRecord::into_job).transpose()
}

impl JobRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new job.
    pub async fn insert(&self, job: &Job) -> Result<Job, DbError> {
        let record: Option<JobRecord> = self
            .db
            .create((TABLE, job.id.to_string()))
            .content(JobRecord::from_job(job))
            .await?;

        record
            .ok_or_else(|| DbError::Query(format!("Failed to create job {}", job.id)))?
            .into_job()
    }

    /// Get a job by ID.
    pub async fn get(&self, id: &JobId) -> Result<Option<Job>, DbError> {
        let record: Option<JobRecord> = self.db.select((TABLE, id.to_string())).await?;
        record.map(JobRecord::into_job).transpose()
    }

    /// Replace a stored job with its current in-memory version.
    pub async fn save(&self, job: &Job) -> Result<Job, DbError> {
        let record: Option<JobRecord> = self
            .db
            .update((TABLE, job.id.to_string()))
            .content(JobRecord::from_job(job))
            .await?;

        record
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", job.id)))?
            .into_job()
    }

    /// Delete a job.
    pub async fn delete(&self, id: &JobId) -> Result<(), DbError> {
        let _: Option<JobRecord> = self.db.delete((TABLE, id.to_string())).await?;
        Ok(())
    }

    /// The non-terminal job for a subject, if one exists.
    pub async fn find_in_flight(
        &self,
        queue: &str,
        subject_id: &str,
    ) -> Result<Option<Job>, DbError> {
        let mut response = self
            .db
            .query(
                r#"
                SELECT * FROM job
                WHERE queue = $queue AND subject_id = $subject AND state INSIDE $states
                ORDER BY seq DESC
                LIMIT 1
                "#,
            )
            .bind(("queue", queue.to_string()))
            .bind(("subject", subject_id.to_string()))
            .bind(("states", in_flight_states()))
            .await?;

        first_job(response.take(0)?)
    }

    /// The most recently finished job for a subject in a terminal state.
    pub async fn latest_finished(
        &self,
        queue: &str,
        subject_id: &str,
        state: JobState,
    ) -> Result<Option<Job>, DbError> {
        let mut response = self
            .db
            .query(
                r#"
                SELECT * FROM job
                WHERE queue = $queue AND subject_id = $subject AND state = $state
                ORDER BY finished_at_ms DESC, seq DESC
                LIMIT 1
                "#,
            )
            .bind(("queue", queue.to_string()))
            .bind(("subject", subject_id.to_string()))
            .bind(("state", state.as_str()))
            .await?;

        first_job(response.take(0)?)
    }

    /// The oldest waiting job of a queue.
    pub async fn next_waiting(&self, queue: &str) -> Result<Option<Job>, DbError> {
        let mut response = self
            .db
            .query(
                r#"
                SELECT * FROM job
                WHERE queue = $queue AND state = "waiting"
                ORDER BY seq ASC
                LIMIT 1
                "#,
            )
            .bind(("queue", queue.to_string()))
            .await?;

        first_job(response.take(0)?)
    }

    /// All jobs of a queue in one partition, in submission order.
    pub async fn list_in_state(&self, queue: &str, state: JobState) -> Result<Vec<Job>, DbError> {
        let mut response = self
            .db
            .query("SELECT * FROM job WHERE queue = $queue AND state = $state ORDER BY seq ASC")
            .bind(("queue", queue.to_string()))
            .bind(("state", state.as_str()))
            .await?;

        into_jobs(response.take(0)?)
    }

    /// Delayed jobs whose run time is at or before `now`.
    pub async fn due_delayed(&self, queue: &str, now: DateTime<Utc>) -> Result<Vec<Job>, DbError> {
        let mut response = self
            .db
            .query(
                r#"
                SELECT * FROM job
                WHERE queue = $queue AND state = "delayed" AND run_at_ms <= $now
                ORDER BY seq ASC
                "#,
            )
            .bind(("queue", queue.to_string()))
            .bind(("now", now.timestamp_millis()))
            .await?;

        into_jobs(response.take(0)?)
    }

    /// Highest sequence number used by a queue, or 0 for an empty queue.
    pub async fn max_seq(&self, queue: &str) -> Result<u64, DbError> {
        #[derive(Deserialize)]
        struct SeqRow {
            seq: u64,
        }

        let mut response = self
            .db
            .query("SELECT seq FROM job WHERE queue = $queue ORDER BY seq DESC LIMIT 1")
            .bind(("queue", queue.to_string()))
            .await?;

        let rows: Vec<SeqRow> = response.take(0)?;
        Ok(rows.first().map_or(0, |r| r.seq))
    }

    /// Count jobs per partition for a queue.
    pub async fn count_by_state(&self, queue: &str) -> Result<HashMap<JobState, u64>, DbError> {
        #[derive(Deserialize)]
        struct StateCount {
            state: Option<String>,
            count: i64,
        }

        let mut response = self
            .db
            .query(
                r#"
                SELECT state, count() AS count
                FROM job
                WHERE queue = $queue
                GROUP BY state
                "#,
            )
            .bind(("queue", queue.to_string()))
            .await?;

        let counts: Vec<StateCount> = response.take(0)?;

        let mut map = HashMap::new();
        for count in counts {
            let Some(state) = count.state.and_then(|s| s.parse::<JobState>().ok()) else {
                continue;
            };
            map.insert(state, count.count.max(0) as u64);
        }

        Ok(map)
    }

    /// Drop finished jobs older than `max_age` or beyond the newest `max_count`.
    ///
    /// Returns the number of deleted jobs.
    pub async fn prune(
        &self,
        queue: &str,
        state: JobState,
        max_age: Duration,
        max_count: usize,
        now: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        if !state.is_terminal() {
            return Ok(0);
        }

        #[derive(Deserialize)]
        struct FinishedRow {
            job_id: String,
            #[serde(default)]
            finished_at_ms: Option<i64>,
        }

        let mut response = self
            .db
            .query(
                r#"
                SELECT job_id, finished_at_ms, seq FROM job
                WHERE queue = $queue AND state = $state
                ORDER BY finished_at_ms DESC, seq DESC
                "#,
            )
            .bind(("queue", queue.to_string()))
            .bind(("state", state.as_str()))
            .await?;

        let rows: Vec<FinishedRow> = response.take(0)?;
        let cutoff = now.timestamp_millis() - max_age.as_millis() as i64;

        let mut removed = 0;
        for (index, row) in rows.into_iter().enumerate() {
            let expired = row.finished_at_ms.is_some_and(|at| at < cutoff);
            if index >= max_count || expired {
                self.delete(&JobId(row.job_id)).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!("Pruned {} {} job(s) from {}", removed, state, queue);
        }

        Ok(removed)
    }
}

fn in_flight_states() -> Vec<String> {
    JobState::IN_FLIGHT
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}
