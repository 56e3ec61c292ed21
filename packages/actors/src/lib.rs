//! Actor system for on-demand job queues.
//!
//! # Architecture
//!
//! - `QueueActor` - Owns a single queue's jobs and serializes their transitions
//! - `LifecycleManager` - Starts a queue's worker on demand, closes it when idle
//! - `WorkerActor` - Pulls jobs from a queue and runs its processor
//! - `QueueSystem` - Opens queues, attaches processors, stops everything
//!
//! # Usage
//!
//! ```ignore
//! use actors::{QueueSystem, FnProcessor};
//!
//! let system = QueueSystem::new(db, QueueConfig::default());
//! let queue = system.open_queue("synthesis").await?;
//! system.attach(&queue, Arc::new(processor)).await?;
//!
//! let job = queue.enqueue("subject-1", EnqueueOptions::default()).await?;
//! ```

mod handle;
mod lifecycle;
mod messages;
mod processor;
mod queue_actor;
pub mod registry;
pub mod status;
mod system;
mod waiter;
mod worker_actor;

pub use handle::QueueHandle;
pub use lifecycle::{LifecycleArgs, LifecycleManager, WorkerState};
pub use messages::{JobOutcome, LifecycleMessage, QueueMessage, WorkerMessage};
pub use processor::{FnProcessor, JobContext, JobProcessor, ProcessFuture, ProcessResult};
pub use queue_actor::{QueueActor, QueueActorArgs};
pub use registry::QueueRegistry;
pub use system::QueueSystem;
pub use waiter::wait_for;
pub use worker_actor::{WorkerActor, WorkerArgs};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
