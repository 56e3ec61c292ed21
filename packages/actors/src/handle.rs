//! Caller-facing handle to a queue actor.

use std::time::Duration;

use queue_core::{
    EnqueueOptions, Job, JobEvent, JobId, JobResult, JobStatusView, QueueCounts, QueueError,
};
use ractor::concurrency::oneshot;
use ractor::{ActorRef, RpcReplyPort};
use tokio::sync::broadcast;

use crate::messages::QueueMessage;
use crate::waiter;

/// Cloneable handle to a named queue.
#[derive(Clone)]
pub struct QueueHandle {
    name: String,
    actor: ActorRef<QueueMessage>,
    events: broadcast::Sender<JobEvent>,
}

impl QueueHandle {
    pub(crate) fn new(
        name: impl Into<String>,
        actor: ActorRef<QueueMessage>,
        events: broadcast::Sender<JobEvent>,
    ) -> Self {
        Self {
            name: name.into(),
            actor,
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn actor(&self) -> &ActorRef<QueueMessage> {
        &self.actor
    }

    /// Send a request and wait for its reply.
    async fn ask<T, F>(&self, build: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce(RpcReplyPort<T>) -> QueueMessage,
    {
        let (tx, rx) = oneshot();
        self.actor
            .send_message(build(tx.into()))
            .map_err(|e| QueueError::Unavailable(format!("{}: {}", self.name, e)))?;
        rx.await
            .map_err(|_| QueueError::Unavailable(format!("{} dropped the request", self.name)))
    }

    /// Enqueue a job for `subject_id`.
    ///
    /// Fails with [`QueueError::Conflict`] while a job for the subject is
    /// waiting, delayed or active. The worker has been notified by the time
    /// this returns.
    pub async fn enqueue(
        &self,
        subject_id: impl Into<String>,
        options: EnqueueOptions,
    ) -> Result<Job, QueueError> {
        let subject_id = subject_id.into();
        self.ask(|reply| QueueMessage::Enqueue {
            subject_id,
            options,
            reply,
        })
        .await?
    }

    /// Project the status of the job for `subject_id`.
    pub async fn status_for(
        &self,
        subject_id: impl Into<String>,
    ) -> Result<JobStatusView, QueueError> {
        let subject_id = subject_id.into();
        self.ask(|reply| QueueMessage::StatusFor { subject_id, reply })
            .await?
    }

    pub async fn fetch(&self, job_id: &JobId) -> Result<Option<Job>, QueueError> {
        let job_id = job_id.clone();
        self.ask(|reply| QueueMessage::GetJob { job_id, reply }).await?
    }

    pub async fn counts(&self) -> Result<QueueCounts, QueueError> {
        self.ask(|reply| QueueMessage::Counts { reply }).await?
    }

    /// Wait up to `timeout` for `job_id` to finish.
    pub async fn wait_for(
        &self,
        job_id: &JobId,
        timeout: Duration,
    ) -> Result<JobResult, QueueError> {
        waiter::wait_for(self, job_id, timeout).await
    }

    /// Subscribe to the events of the whole system this queue belongs to.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle").field("name", &self.name).finish()
    }
}
