//! Job processor trait and the context handed to running jobs.

use futures_util::future::BoxFuture;
use queue_core::{Job, JobId, JobResult};
use ractor::ActorRef;

use crate::messages::QueueMessage;

/// Result type for job processors; the error becomes the failure reason.
pub type ProcessResult = Result<JobResult, String>;

/// Future type for async job processors.
pub type ProcessFuture = BoxFuture<'static, ProcessResult>;

/// Business logic bound to a queue.
///
/// Implement this trait to define how the jobs of one queue are processed.
/// The returned future owns everything it needs; processors are shared
/// between worker restarts.
pub trait JobProcessor: Send + Sync + 'static {
    /// Process a job and return the result.
    fn process(&self, job: Job, ctx: JobContext) -> ProcessFuture;
}

/// Handle a running job uses to talk back to its queue.
#[derive(Clone)]
pub struct JobContext {
    job_id: JobId,
    worker_id: String,
    queue: ActorRef<QueueMessage>,
}

impl JobContext {
    pub(crate) fn new(job_id: JobId, worker_id: String, queue: ActorRef<QueueMessage>) -> Self {
        Self {
            job_id,
            worker_id,
            queue,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Record a progress checkpoint.
    ///
    /// The queue ignores values that do not increase the recorded progress
    /// and caps running jobs at 99; 100 is recorded on completion.
    pub fn report_progress(&self, progress: u8) {
        let message = QueueMessage::Progress {
            job_id: self.job_id.clone(),
            progress,
        };
        if let Err(e) = self.queue.send_message(message) {
            tracing::warn!("Failed to report progress for {}: {}", self.job_id, e);
        }
    }
}

/// A simple function-based processor.
pub struct FnProcessor<F>
where
    F: Fn(Job, JobContext) -> ProcessFuture + Send + Sync + 'static,
{
    processor: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(Job, JobContext) -> ProcessFuture + Send + Sync + 'static,
{
    /// Create a new function-based processor.
    pub fn new(processor: F) -> Self {
        Self { processor }
    }
}

impl<F> JobProcessor for FnProcessor<F>
where
    F: Fn(Job, JobContext) -> ProcessFuture + Send + Sync + 'static,
{
    fn process(&self, job: Job, ctx: JobContext) -> ProcessFuture {
        (self.processor)(job, ctx)
    }
}
