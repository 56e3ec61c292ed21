//! Error taxonomy shared by queues, waiters and callers.

use thiserror::Error;

use crate::JobId;

/// Errors surfaced by queue operations and dependency waits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// A non-terminal job already exists for the subject.
    #[error("a {queue} job is already in flight for subject {subject_id} ({job_id})")]
    Conflict {
        queue: String,
        subject_id: String,
        job_id: JobId,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    /// An awaited job did not reach a terminal state in time.
    #[error("job {job_id} did not finish within {waited_ms}ms")]
    Timeout { job_id: JobId, waited_ms: u64 },

    /// An awaited job finished in the failed state.
    #[error("job {job_id} failed: {reason}")]
    JobFailed { job_id: JobId, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    /// The owning actor is gone or did not answer.
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

impl QueueError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, QueueError::Conflict { .. })
    }
}
