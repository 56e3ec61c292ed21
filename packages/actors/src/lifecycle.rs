//! Worker lifecycle manager: starts a queue's worker on demand and closes it
//! after an idle grace period.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use queue_core::{JobEvent, QueueConfig, QueueCounts};
use ractor::{Actor, ActorProcessingErr, ActorRef, SupervisionEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use ulid::Ulid;

use crate::messages::{LifecycleMessage, QueueMessage, WorkerMessage};
use crate::processor::JobProcessor;
use crate::worker_actor::{WorkerActor, WorkerArgs};

const COUNTS_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of a queue's worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    #[default]
    Stopped,
    Starting,
    Running,
    /// The queue drained; the idle timer is armed.
    Draining,
}

/// Arguments for spawning a lifecycle manager.
pub struct LifecycleArgs {
    pub queue_name: String,
    pub queue: ActorRef<QueueMessage>,
    pub config: QueueConfig,
    pub processor: Arc<dyn JobProcessor>,
    pub event_tx: broadcast::Sender<JobEvent>,
}

/// State for the lifecycle manager.
pub struct LifecycleState {
    queue_name: String,
    queue: ActorRef<QueueMessage>,
    config: QueueConfig,
    processor: Arc<dyn JobProcessor>,
    event_tx: broadcast::Sender<JobEvent>,
    state: WorkerState,
    workers: Vec<(String, ActorRef<WorkerMessage>)>,
    idle_timer: Option<JoinHandle<()>>,
    /// Bumped on every arm so a stale timer can be told apart.
    generation: u64,
}

impl LifecycleState {
    fn broadcast(&self, event: JobEvent) {
        tracing::debug!("{}", event.description());
        let _ = self.event_tx.send(event);
    }

    fn cancel_idle_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
    }

    fn nudge_workers(&self) {
        for (worker_id, worker) in &self.workers {
            if let Err(e) = worker.send_message(WorkerMessage::Poll) {
                tracing::warn!("Failed to nudge worker {}: {}", worker_id, e);
            }
        }
    }

    async fn counts(&self) -> Option<QueueCounts> {
        let result = ractor::rpc::call(
            &self.queue,
            |reply| QueueMessage::Counts { reply },
            Some(COUNTS_TIMEOUT),
        )
        .await;

        match result {
            Ok(ractor::rpc::CallResult::Success(Ok(counts))) => Some(counts),
            Ok(ractor::rpc::CallResult::Success(Err(e))) => {
                tracing::warn!("Failed to count jobs of {}: {}", self.queue_name, e);
                None
            }
            _ => {
                tracing::warn!("Queue {} did not answer a count request", self.queue_name);
                None
            }
        }
    }

    async fn ensure_running(&mut self, myself: &ActorRef<LifecycleMessage>) {
        match self.state {
            WorkerState::Starting | WorkerState::Running => self.nudge_workers(),
            WorkerState::Draining => {
                self.cancel_idle_timer();
                self.state = WorkerState::Running;
                tracing::debug!("Idle shutdown of {} cancelled", self.queue_name);
                self.nudge_workers();
            }
            WorkerState::Stopped => {
                self.state = WorkerState::Starting;
                for _ in 0..self.config.concurrency.max(1) {
                    if let Err(e) = self.spawn_worker(myself).await {
                        tracing::error!("Failed to start worker of {}: {}", self.queue_name, e);
                        break;
                    }
                }
                // Stay restartable: the next enqueue or ensure call retries.
                self.state = if self.workers.is_empty() {
                    WorkerState::Stopped
                } else {
                    WorkerState::Running
                };
            }
        }
    }

    async fn spawn_worker(
        &mut self,
        myself: &ActorRef<LifecycleMessage>,
    ) -> Result<(), ActorProcessingErr> {
        let worker_id = format!("{}-worker-{}", self.queue_name, Ulid::new());
        let args = WorkerArgs {
            worker_id: worker_id.clone(),
            queue: self.queue.clone(),
            processor: self.processor.clone(),
            lifecycle: myself.clone(),
        };

        let (worker, _handle) =
            Actor::spawn_linked(None, WorkerActor, args, myself.get_cell()).await?;

        self.workers.push((worker_id.clone(), worker));
        self.broadcast(JobEvent::WorkerStarted {
            worker_id,
            queue: self.queue_name.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn arm_idle_timer(&mut self, myself: &ActorRef<LifecycleMessage>) {
        self.cancel_idle_timer();
        self.generation += 1;
        self.state = WorkerState::Draining;

        let generation = self.generation;
        let wait = self.config.idle_timeout();
        let myself = myself.clone();
        self.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let _ = myself.send_message(LifecycleMessage::IdleTimeout { generation });
        }));
    }

    fn close_workers(&mut self, reason: &str, kill: bool) {
        for (worker_id, worker) in self.workers.drain(..) {
            if kill {
                worker.kill();
            } else {
                worker.stop(Some(reason.to_string()));
            }
            let _ = self.event_tx.send(JobEvent::WorkerStopped {
                worker_id,
                queue: self.queue_name.clone(),
                reason: reason.to_string(),
                timestamp: Utc::now(),
            });
        }
        self.state = WorkerState::Stopped;
    }

    /// Start a worker if the queue holds work nobody is processing.
    async fn reconcile(&mut self, myself: &ActorRef<LifecycleMessage>) {
        if let Some(counts) = self.counts().await
            && !counts.is_idle()
        {
            tracing::info!(
                "Queue {} has {} pending jobs, starting worker",
                self.queue_name,
                counts.pending()
            );
            self.ensure_running(myself).await;
        }
    }
}

/// Actor owning the worker of a single queue.
///
/// Its mailbox serializes every transition; `Starting` is only ever observed
/// inside a single message, so concurrent ensure calls never create two
/// workers.
pub struct LifecycleManager;

impl Actor for LifecycleManager {
    type Msg = LifecycleMessage;
    type State = LifecycleState;
    type Arguments = LifecycleArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting lifecycle manager for queue: {}", args.queue_name);

        // Attach before counting: anything enqueued after the attach notifies
        // us, anything before is in the counts.
        args.queue.send_message(QueueMessage::AttachLifecycle {
            lifecycle: myself.clone(),
        })?;

        let mut state = LifecycleState {
            queue_name: args.queue_name,
            queue: args.queue,
            config: args.config,
            processor: args.processor,
            event_tx: args.event_tx,
            state: WorkerState::Stopped,
            workers: Vec::new(),
            idle_timer: None,
            generation: 0,
        };

        state.reconcile(&myself).await;

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            LifecycleMessage::EnsureRunning => {
                state.ensure_running(&myself).await;
            }

            LifecycleMessage::Drained { worker_id } => {
                // The grace period always runs from the latest drain.
                let known = state.workers.iter().any(|(id, _)| *id == worker_id);
                let settled = matches!(state.state, WorkerState::Running | WorkerState::Draining);
                if known && settled {
                    tracing::debug!(
                        "Queue {} drained, closing worker in {}ms",
                        state.queue_name,
                        state.config.idle_timeout_ms
                    );
                    state.arm_idle_timer(&myself);
                }
            }

            LifecycleMessage::IdleTimeout { generation } => {
                if generation != state.generation || state.state != WorkerState::Draining {
                    return Ok(());
                }
                state.idle_timer = None;

                match state.counts().await {
                    Some(counts) if counts.is_idle() => {
                        tracing::info!("Queue {} idle, closing worker", state.queue_name);
                        state.close_workers("idle", false);
                    }
                    _ => {
                        state.state = WorkerState::Running;
                        state.nudge_workers();
                    }
                }
            }

            LifecycleMessage::GetState { reply } => {
                let _ = reply.send(state.state);
            }

            LifecycleMessage::Shutdown { reply } => {
                tracing::info!("Shutting down lifecycle manager: {}", state.queue_name);
                state.cancel_idle_timer();
                state.close_workers("shutdown", true);
                let _ = reply.send(());
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let (cell, reason) = match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => (cell, reason),
            SupervisionEvent::ActorFailed(cell, err) => (cell, Some(err.to_string())),
            _ => return Ok(()),
        };

        // Workers we closed ourselves are already gone from the list.
        let Some(index) = state
            .workers
            .iter()
            .position(|(_, worker)| worker.get_id() == cell.get_id())
        else {
            return Ok(());
        };

        let (worker_id, _) = state.workers.remove(index);
        let reason = reason.unwrap_or_else(|| "terminated".to_string());
        tracing::warn!("Worker {} terminated unexpectedly: {}", worker_id, reason);
        state.queue.send_message(QueueMessage::WorkerLost {
            worker_id: worker_id.clone(),
            reason: reason.clone(),
        })?;
        state.broadcast(JobEvent::WorkerStopped {
            worker_id,
            queue: state.queue_name.clone(),
            reason,
            timestamp: Utc::now(),
        });

        if state.workers.is_empty() {
            state.cancel_idle_timer();
            state.state = WorkerState::Stopped;
            state.reconcile(&myself).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::marker::PhantomData;

    use queue_core::{Job, JobResult};
    use ractor::Message;

    use super::*;
    use crate::processor::{FnProcessor, JobContext, ProcessFuture};

    /// Swallows every message.
    struct Sink<M>(PhantomData<fn() -> M>);

    impl<M: Message> Actor for Sink<M> {
        type Msg = M;
        type State = ();
        type Arguments = ();

        async fn pre_start(
            &self,
            _myself: ActorRef<Self::Msg>,
            _args: Self::Arguments,
        ) -> Result<Self::State, ActorProcessingErr> {
            Ok(())
        }
    }

    async fn sink<M: Message>() -> ActorRef<M> {
        let (actor, _handle) = Actor::spawn(None, Sink(PhantomData), ()).await.unwrap();
        actor
    }

    fn state_for(queue: ActorRef<QueueMessage>) -> LifecycleState {
        let (event_tx, _) = broadcast::channel(16);
        LifecycleState {
            queue_name: "synthesis".to_string(),
            queue,
            config: QueueConfig::default(),
            processor: Arc::new(FnProcessor::new(|job: Job, _ctx: JobContext| -> ProcessFuture {
                Box::pin(async move { Ok(JobResult::new(job.subject_id)) })
            })),
            event_tx,
            state: WorkerState::Stopped,
            workers: Vec::new(),
            idle_timer: None,
            generation: 0,
        }
    }

    #[tokio::test]
    async fn failed_spawn_leaves_manager_restartable() {
        let (queue, handle) = Actor::spawn(None, Sink::<QueueMessage>(PhantomData), ())
            .await
            .unwrap();
        queue.stop(None);
        handle.await.unwrap();

        let manager = sink::<LifecycleMessage>().await;
        let mut state = state_for(queue);

        state.ensure_running(&manager).await;
        assert_eq!(state.state, WorkerState::Stopped);
        assert!(state.workers.is_empty());

        // A later attempt against a live queue starts normally.
        state.queue = sink::<QueueMessage>().await;
        state.ensure_running(&manager).await;
        assert_eq!(state.state, WorkerState::Running);
        assert_eq!(state.workers.len(), 1);

        for (_, worker) in state.workers.drain(..) {
            worker.kill();
        }
        manager.stop(None);
    }
}
