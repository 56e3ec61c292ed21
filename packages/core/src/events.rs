//! Event types pushed to subscribers of a queue system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId};

/// Events emitted by queues and their workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    // Job events
    /// A new job was enqueued.
    JobEnqueued { job: Job, timestamp: DateTime<Utc> },
    /// Delayed jobs became due and moved to waiting.
    JobsPromoted {
        queue: String,
        count: u64,
        timestamp: DateTime<Utc>,
    },
    /// A worker leased a job.
    JobStarted {
        job_id: JobId,
        queue: String,
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A job's recorded progress increased.
    JobProgress {
        job_id: JobId,
        queue: String,
        progress: u8,
        timestamp: DateTime<Utc>,
    },
    /// A job completed successfully.
    JobCompleted {
        job_id: JobId,
        queue: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job failed.
    JobFailed {
        job_id: JobId,
        queue: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    // Queue and worker events
    /// A worker asked for work and the queue had none to hand out.
    QueueDrained {
        queue: String,
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A worker was started for a queue.
    WorkerStarted {
        worker_id: String,
        queue: String,
        timestamp: DateTime<Utc>,
    },
    /// A worker was closed.
    WorkerStopped {
        worker_id: String,
        queue: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobEnqueued { timestamp, .. } => *timestamp,
            JobEvent::JobsPromoted { timestamp, .. } => *timestamp,
            JobEvent::JobStarted { timestamp, .. } => *timestamp,
            JobEvent::JobProgress { timestamp, .. } => *timestamp,
            JobEvent::JobCompleted { timestamp, .. } => *timestamp,
            JobEvent::JobFailed { timestamp, .. } => *timestamp,
            JobEvent::QueueDrained { timestamp, .. } => *timestamp,
            JobEvent::WorkerStarted { timestamp, .. } => *timestamp,
            JobEvent::WorkerStopped { timestamp, .. } => *timestamp,
        }
    }

    /// Get the queue name associated with this event.
    pub fn queue(&self) -> &str {
        match self {
            JobEvent::JobEnqueued { job, .. } => &job.queue,
            JobEvent::JobsPromoted { queue, .. } => queue,
            JobEvent::JobStarted { queue, .. } => queue,
            JobEvent::JobProgress { queue, .. } => queue,
            JobEvent::JobCompleted { queue, .. } => queue,
            JobEvent::JobFailed { queue, .. } => queue,
            JobEvent::QueueDrained { queue, .. } => queue,
            JobEvent::WorkerStarted { queue, .. } => queue,
            JobEvent::WorkerStopped { queue, .. } => queue,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            JobEvent::JobEnqueued { job, .. } => Some(&job.id),
            JobEvent::JobStarted { job_id, .. } => Some(job_id),
            JobEvent::JobProgress { job_id, .. } => Some(job_id),
            JobEvent::JobCompleted { job_id, .. } => Some(job_id),
            JobEvent::JobFailed { job_id, .. } => Some(job_id),
            _ => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobEnqueued { job, .. } => {
                format!("Job {} enqueued for {}", job.id, job.subject_id)
            }
            JobEvent::JobsPromoted { queue, count, .. } => {
                format!("{} delayed job(s) promoted in {}", count, queue)
            }
            JobEvent::JobStarted {
                job_id, worker_id, ..
            } => format!("Job {} started by {}", job_id, worker_id),
            JobEvent::JobProgress {
                job_id, progress, ..
            } => format!("Job {} at {}%", job_id, progress),
            JobEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} completed in {}ms", job_id, duration_ms),
            JobEvent::JobFailed { job_id, error, .. } => {
                format!("Job {} failed: {}", job_id, error)
            }
            JobEvent::QueueDrained { queue, .. } => format!("Queue {} drained", queue),
            JobEvent::WorkerStarted {
                worker_id, queue, ..
            } => format!("Worker {} started for {}", worker_id, queue),
            JobEvent::WorkerStopped {
                worker_id,
                queue,
                reason,
                ..
            } => format!("Worker {} stopped for {}: {}", worker_id, queue, reason),
        }
    }
}
