//! Caller-facing projection of a subject's job status.

use serde::{Deserialize, Serialize};

use crate::{Job, JobId, JobResult, JobState};

/// Coarse status reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    None,
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl From<JobState> for StatusKind {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Waiting => StatusKind::Waiting,
            JobState::Delayed => StatusKind::Delayed,
            JobState::Active => StatusKind::Active,
            JobState::Completed => StatusKind::Completed,
            JobState::Failed => StatusKind::Failed,
        }
    }
}

/// Answer to "what is going on for subject X in this queue".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub status: StatusKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatusView {
    pub fn none() -> Self {
        Self {
            status: StatusKind::None,
            job_id: None,
            progress: None,
            result: None,
            error: None,
        }
    }

    /// Project a job record into the view for its current partition.
    pub fn from_job(job: &Job) -> Self {
        let mut view = Self {
            status: job.state.into(),
            job_id: Some(job.id.clone()),
            ..Self::none()
        };
        match job.state {
            JobState::Completed => view.result = job.result.clone(),
            JobState::Failed => view.error = job.failure_reason.clone(),
            _ => view.progress = Some(job.progress),
        }
        view
    }
}
