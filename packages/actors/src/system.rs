//! Entry point wiring queues, processors and lifecycle managers together.

use std::sync::Arc;

use db::Database;
use db::repositories::JobRepository;
use queue_core::{JobEvent, QueueConfig, QueueError};
use ractor::{Actor, ActorRef};
use ractor::concurrency::oneshot;
use tokio::sync::broadcast;

use crate::handle::QueueHandle;
use crate::lifecycle::{LifecycleArgs, LifecycleManager, WorkerState};
use crate::messages::{LifecycleMessage, QueueMessage};
use crate::processor::JobProcessor;
use crate::queue_actor::{QueueActor, QueueActorArgs};
use crate::registry::QueueRegistry;

const EVENT_CAPACITY: usize = 1024;

/// A set of queues sharing one database and one event stream.
pub struct QueueSystem {
    repo: JobRepository,
    config: QueueConfig,
    registry: QueueRegistry,
    event_tx: broadcast::Sender<JobEvent>,
}

impl QueueSystem {
    /// Create a system whose queues default to `config`.
    pub fn new(db: Database, config: QueueConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            repo: JobRepository::new(db),
            config,
            registry: QueueRegistry::new(),
            event_tx,
        }
    }

    pub fn registry(&self) -> &QueueRegistry {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    /// Open the queue `name` with the system's default config.
    pub async fn open_queue(&self, name: &str) -> Result<QueueHandle, QueueError> {
        self.open_queue_with(name, self.config.clone()).await
    }

    /// Open the queue `name`, or return the handle if it is already open.
    pub async fn open_queue_with(
        &self,
        name: &str,
        config: QueueConfig,
    ) -> Result<QueueHandle, QueueError> {
        if let Some(handle) = self.registry.get_queue(name) {
            return Ok(handle);
        }

        let args = QueueActorArgs {
            name: name.to_string(),
            config,
            repo: self.repo.clone(),
            event_tx: self.event_tx.clone(),
        };
        let (actor, _handle) = Actor::spawn(None, QueueActor, args)
            .await
            .map_err(|e| QueueError::Unavailable(format!("failed to spawn queue {name}: {e}")))?;

        let handle = QueueHandle::new(name, actor.clone(), self.event_tx.clone());
        if !self.registry.register_queue(handle.clone()) {
            // Lost a race with another open of the same name.
            actor.stop(None);
            return self
                .registry
                .get_queue(name)
                .ok_or_else(|| QueueError::Unavailable(name.to_string()));
        }

        Ok(handle)
    }

    /// Bind `processor` to `queue` and start its lifecycle manager.
    ///
    /// The manager performs a single reconciliation: if the queue already
    /// holds pending jobs, a worker starts without waiting for an enqueue.
    pub async fn attach(
        &self,
        queue: &QueueHandle,
        processor: Arc<dyn JobProcessor>,
    ) -> Result<(), QueueError> {
        let name = queue.name();
        if !self.registry.reserve_lifecycle(name) {
            return Err(QueueError::Invalid(format!("queue {name} already has a processor")));
        }

        let config = self.queue_config(queue).await;
        let args = LifecycleArgs {
            queue_name: name.to_string(),
            queue: queue.actor().clone(),
            config,
            processor,
            event_tx: self.event_tx.clone(),
        };
        let lifecycle = match Actor::spawn(None, LifecycleManager, args).await {
            Ok((lifecycle, _handle)) => lifecycle,
            Err(e) => {
                self.registry.release_lifecycle(name);
                return Err(QueueError::Unavailable(format!(
                    "failed to start worker of {name}: {e}"
                )));
            }
        };

        if !self.registry.register_lifecycle(name, lifecycle.clone()) {
            // The system was stopped while the manager started.
            shutdown_lifecycle(&lifecycle).await;
            return Err(QueueError::Unavailable(format!("queue {name} is closed")));
        }
        Ok(())
    }

    async fn queue_config(&self, queue: &QueueHandle) -> QueueConfig {
        let (tx, rx) = oneshot();
        if queue
            .actor()
            .send_message(QueueMessage::GetConfig { reply: tx.into() })
            .is_ok()
            && let Ok(config) = rx.await
        {
            return config;
        }
        self.config.clone()
    }

    /// Make sure the worker of `name` is running.
    pub fn ensure_running(&self, name: &str) -> Result<(), QueueError> {
        let lifecycle = self
            .registry
            .get_lifecycle(name)
            .ok_or_else(|| QueueError::NotFound(format!("no processor attached to {name}")))?;
        lifecycle
            .send_message(LifecycleMessage::EnsureRunning)
            .map_err(|e| QueueError::Unavailable(format!("{name}: {e}")))
    }

    /// Current worker state of `name`; `Stopped` if no processor is attached.
    pub async fn worker_state(&self, name: &str) -> WorkerState {
        let Some(lifecycle) = self.registry.get_lifecycle(name) else {
            return WorkerState::Stopped;
        };
        let (tx, rx) = oneshot();
        if lifecycle
            .send_message(LifecycleMessage::GetState { reply: tx.into() })
            .is_err()
        {
            return WorkerState::Stopped;
        }
        rx.await.unwrap_or_default()
    }

    /// Stop every worker and queue without draining.
    ///
    /// In-flight jobs are abandoned; everything else stays in the database for
    /// the next process.
    pub async fn stop(&self) {
        for (queue, lifecycle) in self.registry.drain() {
            if let Some(lifecycle) = lifecycle {
                shutdown_lifecycle(&lifecycle).await;
            }
            let _ = queue.actor().send_message(QueueMessage::Shutdown);
            tracing::info!("Stopped queue {}", queue.name());
        }
    }
}

/// Close a manager's workers and wait until it has done so.
async fn shutdown_lifecycle(lifecycle: &ActorRef<LifecycleMessage>) {
    let (tx, rx) = oneshot();
    if lifecycle
        .send_message(LifecycleMessage::Shutdown { reply: tx.into() })
        .is_ok()
    {
        let _ = rx.await;
    }
}
