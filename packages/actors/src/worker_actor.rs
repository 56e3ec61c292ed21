//! Worker actor for executing jobs.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use queue_core::Job;
use ractor::{Actor, ActorProcessingErr, ActorRef, ActorStatus};

use crate::messages::{LifecycleMessage, QueueMessage, WorkerMessage};
use crate::processor::{JobContext, JobProcessor, ProcessResult};

/// How long a worker waits for the queue to hand out a job.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker_id: String,
    pub queue: ActorRef<QueueMessage>,
    pub processor: Arc<dyn JobProcessor>,
    pub lifecycle: ActorRef<LifecycleMessage>,
}

/// State for the worker actor.
pub struct WorkerActorState {
    worker_id: String,
    queue: ActorRef<QueueMessage>,
    processor: Arc<dyn JobProcessor>,
    lifecycle: ActorRef<LifecycleMessage>,
    /// Jobs processed since the worker started.
    processed: u64,
}

impl WorkerActorState {
    async fn request_job(&self) -> Option<Job> {
        let worker_id = self.worker_id.clone();
        let result = ractor::rpc::call(
            &self.queue,
            |reply| QueueMessage::RequestJob { worker_id, reply },
            Some(REQUEST_TIMEOUT),
        )
        .await;

        match result {
            Ok(ractor::rpc::CallResult::Success(job)) => job,
            Ok(_) => {
                tracing::warn!("Worker {} got no answer from its queue", self.worker_id);
                None
            }
            Err(e) => {
                tracing::warn!("Worker {} could not reach its queue: {}", self.worker_id, e);
                None
            }
        }
    }

    async fn run(&self, job: Job) -> ProcessResult {
        let ctx = JobContext::new(job.id.clone(), self.worker_id.clone(), self.queue.clone());
        let processor = self.processor.clone();

        // A panicking processor fails its job instead of taking the worker down.
        match AssertUnwindSafe(async move { processor.process(job, ctx).await })
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(format!("processor panicked: {detail}"))
            }
        }
    }
}

/// Worker actor that executes jobs.
///
/// A worker polls its queue until the queue reports nothing to hand out,
/// then tells the lifecycle manager it drained and waits to be nudged.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker: {}", args.worker_id);

        if !matches!(args.queue.get_status(), ActorStatus::Running) {
            return Err(format!("queue of worker {} is not running", args.worker_id).into());
        }

        myself.send_message(WorkerMessage::Poll)?;

        Ok(WorkerActorState {
            worker_id: args.worker_id,
            queue: args.queue,
            processor: args.processor,
            lifecycle: args.lifecycle,
            processed: 0,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Poll => {
                let Some(job) = state.request_job().await else {
                    state.lifecycle.send_message(LifecycleMessage::Drained {
                        worker_id: state.worker_id.clone(),
                    })?;
                    return Ok(());
                };

                let job_id = job.id.clone();
                tracing::debug!("Worker {} processing {}", state.worker_id, job_id);

                let message = match state.run(job).await {
                    Ok(result) => QueueMessage::JobCompleted {
                        job_id,
                        worker_id: state.worker_id.clone(),
                        result,
                    },
                    Err(error) => QueueMessage::JobFailed {
                        job_id,
                        worker_id: state.worker_id.clone(),
                        error,
                    },
                };
                state.queue.send_message(message)?;
                state.processed += 1;

                myself.send_message(WorkerMessage::Poll)?;
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            "Worker {} stopped after {} jobs",
            state.worker_id,
            state.processed
        );
        Ok(())
    }
}
