//! Cooperative wait on a job owned by another queue.

use std::time::Duration;

use queue_core::{JobId, JobResult, QueueError};
use ractor::concurrency::oneshot;

use crate::handle::QueueHandle;
use crate::messages::{JobOutcome, QueueMessage};

/// Wait until `job_id` in `queue` completes or fails, at most `timeout`.
///
/// The queue actor answers as soon as the job reaches a terminal state, or
/// right away if it already has.
pub async fn wait_for(
    queue: &QueueHandle,
    job_id: &JobId,
    timeout: Duration,
) -> Result<JobResult, QueueError> {
    let (tx, rx) = oneshot();
    queue
        .actor()
        .send_message(QueueMessage::Watch {
            job_id: job_id.clone(),
            reply: tx.into(),
        })
        .map_err(|e| QueueError::Unavailable(format!("{}: {}", queue.name(), e)))?;

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(JobOutcome::Completed(result))) => Ok(result),
        Ok(Ok(JobOutcome::Failed(reason))) => Err(QueueError::JobFailed {
            job_id: job_id.clone(),
            reason,
        }),
        Ok(Ok(JobOutcome::Missing)) => Err(QueueError::NotFound(format!(
            "job {} in queue {}",
            job_id,
            queue.name()
        ))),
        Ok(Err(_)) => Err(QueueError::Unavailable(format!(
            "{} stopped while job {} was awaited",
            queue.name(),
            job_id
        ))),
        Err(_) => Err(QueueError::Timeout {
            job_id: job_id.clone(),
            waited_ms: timeout.as_millis() as u64,
        }),
    }
}
