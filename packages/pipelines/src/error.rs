//! Pipeline errors. Their display text becomes the job's failure reason.

use queue_core::{JobId, QueueError};
use thiserror::Error;

use crate::collaborators::CollaboratorError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A collaborator failed after the retries the step allows.
    #[error("{step} failed: {message}")]
    Upstream { step: &'static str, message: String },

    /// An awaited job failed, timed out or vanished.
    #[error("dependency {job_id} did not succeed: {source}")]
    Dependency {
        job_id: JobId,
        #[source]
        source: QueueError,
    },

    /// The dependency could not be enqueued because one is already in flight.
    #[error("dependency conflict: {0}")]
    Conflict(QueueError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl PipelineError {
    /// Map a collaborator failure inside `step`.
    pub fn upstream(step: &'static str) -> impl FnOnce(CollaboratorError) -> Self {
        move |e| match e {
            CollaboratorError::NotFound(what) => PipelineError::NotFound(what),
            CollaboratorError::Failed(message) => PipelineError::Upstream { step, message },
        }
    }
}
