//! Job domain types for work items in a queue.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload key that always carries the subject-of-work identifier.
pub const SUBJECT_KEY: &str = "subject_id";

/// Identifier of a job, derived from its type, subject and submission time.
///
/// The format is `{job_type}-{subject_id}-{unix_millis}` so that ids can be
/// traced back to the work they describe straight from the logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Derive the id for a job submitted at `at`.
    pub fn derive(job_type: &str, subject_id: &str, at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}-{}-{}",
            job_type,
            subject_id,
            at.timestamp_millis()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Partition a job currently lives in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Ready to be handed to a worker.
    #[default]
    Waiting,
    /// Scheduled for later; promoted to waiting when due.
    Delayed,
    /// Leased by a worker.
    Active,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl JobState {
    /// Non-terminal states; at most one job per subject may be in one of these.
    pub const IN_FLIGHT: [JobState; 3] = [JobState::Waiting, JobState::Delayed, JobState::Active];

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn is_in_flight(self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(JobState::Waiting),
            "delayed" => Ok(JobState::Delayed),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            other => Err(format!("unknown job state: {other}")),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Human-readable summary of the result.
    pub summary: String,
    /// Optional structured output data as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

impl JobResult {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            output: None,
        }
    }

    pub fn with_output(summary: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            summary: summary.into(),
            output: Some(output),
        }
    }

    /// Read a string field from the structured output.
    pub fn output_str(&self, key: &str) -> Option<&str> {
        self.output.as_ref()?.get(key)?.as_str()
    }
}

/// Options accepted when enqueuing a job.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Extra payload fields; `subject_id` is always filled in by the queue.
    pub payload: serde_json::Map<String, serde_json::Value>,
    /// Hold the job in the delayed partition for this long before it runs.
    pub delay: Option<Duration>,
}

impl EnqueueOptions {
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A unit of work held by a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Name of the owning queue.
    pub queue: String,
    /// Type of work; equal to the queue name for every queue in this system.
    pub job_type: String,
    /// The subject-of-work this job operates on.
    pub subject_id: String,
    /// Job payload; always an object containing `subject_id`.
    pub payload: serde_json::Value,
    pub state: JobState,
    /// Progress percentage in `0..=100`.
    pub progress: u8,
    /// Submission order within the queue.
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl Job {
    /// Create a new waiting job for `subject_id`.
    pub fn new(
        queue: impl Into<String>,
        subject_id: impl Into<String>,
        mut payload: serde_json::Map<String, serde_json::Value>,
        seq: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let queue = queue.into();
        let subject_id = subject_id.into();
        payload.insert(
            SUBJECT_KEY.to_string(),
            serde_json::Value::String(subject_id.clone()),
        );

        Self {
            id: JobId::derive(&queue, &subject_id, now),
            job_type: queue.clone(),
            queue,
            subject_id,
            payload: serde_json::Value::Object(payload),
            state: JobState::Waiting,
            progress: 0,
            seq,
            created_at: now,
            run_at: None,
            processed_at: None,
            finished_at: None,
            result: None,
            failure_reason: None,
        }
    }

    /// Hold the job in the delayed partition until `run_at`.
    pub fn delayed_until(mut self, run_at: DateTime<Utc>) -> Self {
        self.state = JobState::Delayed;
        self.run_at = Some(run_at);
        self
    }

    /// Read a string field from the payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key)?.as_str()
    }

    /// Time spent between being leased and finishing, if both are known.
    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.processed_at?;
        let finished = self.finished_at?;
        Some((finished - started).num_milliseconds().max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use chrono::TimeZone;

    use super::*;

    #[test]
    fn job_id_is_traceable() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let id = JobId::derive("synthesis", "project-7", at);
        assert_eq!(id.as_str(), "synthesis-project-7-1700000000123");
    }

    #[test]
    fn payload_always_carries_subject() {
        let mut extra = serde_json::Map::new();
        extra.insert("requested_by".into(), serde_json::json!("ops"));
        let job = Job::new("derivation", "p1", extra, 3, Utc::now());

        assert_eq!(job.payload_str(SUBJECT_KEY), Some("p1"));
        assert_eq!(job.payload_str("requested_by"), Some("ops"));
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.job_type, "derivation");
        assert_eq!(job.seq, 3);
    }

    #[test]
    fn in_flight_states_are_the_non_terminal_ones() {
        for state in JobState::IN_FLIGHT {
            assert!(state.is_in_flight());
        }
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert_eq!("delayed".parse::<JobState>(), Ok(JobState::Delayed));
        assert!("paused".parse::<JobState>().is_err());
    }
}
