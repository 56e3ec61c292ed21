//! Message types for actor communication.

use queue_core::{
    EnqueueOptions, Job, JobId, JobResult, JobStatusView, QueueConfig, QueueCounts, QueueError,
};
use ractor::{ActorRef, RpcReplyPort};

use crate::lifecycle::WorkerState;

/// Terminal outcome of a watched job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(JobResult),
    Failed(String),
    /// The job does not exist (never enqueued, or already pruned).
    Missing,
}

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Enqueue a new job for a subject.
    Enqueue {
        subject_id: String,
        options: EnqueueOptions,
        reply: RpcReplyPort<Result<Job, QueueError>>,
    },

    /// Request the next job for a worker.
    RequestJob {
        worker_id: String,
        reply: RpcReplyPort<Option<Job>>,
    },

    /// Record progress of a leased job.
    Progress { job_id: JobId, progress: u8 },

    /// Report job completion.
    JobCompleted {
        job_id: JobId,
        worker_id: String,
        result: JobResult,
    },

    /// Report job failure.
    JobFailed {
        job_id: JobId,
        worker_id: String,
        error: String,
    },

    /// Get a job by ID.
    GetJob {
        job_id: JobId,
        reply: RpcReplyPort<Result<Option<Job>, QueueError>>,
    },

    /// Project the status of a subject's job.
    StatusFor {
        subject_id: String,
        reply: RpcReplyPort<Result<JobStatusView, QueueError>>,
    },

    /// Get the queue's configuration.
    GetConfig { reply: RpcReplyPort<QueueConfig> },

    /// Count jobs per partition.
    Counts {
        reply: RpcReplyPort<Result<QueueCounts, QueueError>>,
    },

    /// Resolve `reply` once the job reaches a terminal state.
    Watch {
        job_id: JobId,
        reply: RpcReplyPort<JobOutcome>,
    },

    /// Fail the jobs leased by a worker that died.
    WorkerLost { worker_id: String, reason: String },

    /// Attach the lifecycle manager notified on every enqueue.
    AttachLifecycle {
        lifecycle: ActorRef<LifecycleMessage>,
    },

    /// Move due delayed jobs to waiting.
    PromoteDelayed,

    /// Retry storing the final state of a finished job.
    RetryFinish { job_id: JobId },

    /// Shutdown the queue.
    Shutdown,
}

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Ask the queue for work and process whatever it hands out.
    Poll,
}

/// Messages for the LifecycleManager.
#[derive(Debug)]
pub enum LifecycleMessage {
    /// Work may be available: make sure a worker is running.
    EnsureRunning,

    /// A worker found the queue empty.
    Drained { worker_id: String },

    /// The idle grace period armed at `generation` elapsed.
    IdleTimeout { generation: u64 },

    /// Get the current lifecycle state.
    GetState { reply: RpcReplyPort<WorkerState> },

    /// Stop the worker without draining and stop the manager.
    Shutdown { reply: RpcReplyPort<()> },
}
