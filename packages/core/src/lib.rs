//! Core domain types for the on-demand job processing system.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobId and JobState for work items
//! - QueueConfig, QueueCounts and RetentionPolicy for queues
//! - JobStatusView for status projection
//! - Events for push notifications
//! - QueueError, the error taxonomy shared by queues and waiters

mod error;
mod events;
mod job;
mod queue;
mod status;

pub use error::QueueError;
pub use events::JobEvent;
pub use job::{EnqueueOptions, Job, JobId, JobResult, JobState, SUBJECT_KEY};
pub use queue::{QueueConfig, QueueCounts, RetentionPolicy};
pub use status::{JobStatusView, StatusKind};
