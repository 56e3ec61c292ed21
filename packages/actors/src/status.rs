//! Status projection over a queue's partitions.

use db::DbError;
use db::repositories::JobRepository;
use queue_core::{JobState, JobStatusView};

/// Project the status of `subject_id` in `queue`.
///
/// In-flight jobs win over finished ones, and completed records win over
/// failed ones; a subject with no job in any partition is `none`.
pub async fn project(
    repo: &JobRepository,
    queue: &str,
    subject_id: &str,
) -> Result<JobStatusView, DbError> {
    if let Some(job) = repo.find_in_flight(queue, subject_id).await? {
        return Ok(JobStatusView::from_job(&job));
    }

    for state in [JobState::Completed, JobState::Failed] {
        if let Some(job) = repo.latest_finished(queue, subject_id, state).await? {
            return Ok(JobStatusView::from_job(&job));
        }
    }

    Ok(JobStatusView::none())
}
