//! Queue actor owning a single named queue.
//!
//! Every state transition of the queue's jobs goes through this actor, so
//! the duplicate-subject check and the insert that follows it can never
//! interleave with another enqueue.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use db::DbError;
use db::repositories::JobRepository;
use queue_core::{
    EnqueueOptions, Job, JobEvent, JobId, JobResult, JobState, QueueConfig, QueueCounts,
    QueueError,
};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tokio::sync::broadcast;

use crate::messages::{JobOutcome, LifecycleMessage, QueueMessage};
use crate::status;

/// Wait before retrying a final state the database refused.
const FINISH_RETRY_DELAY: Duration = Duration::from_millis(250);

pub(crate) fn storage_err(e: DbError) -> QueueError {
    QueueError::Storage(e.to_string())
}

/// Arguments for spawning a queue actor.
pub struct QueueActorArgs {
    pub name: String,
    pub config: QueueConfig,
    pub repo: JobRepository,
    pub event_tx: broadcast::Sender<JobEvent>,
}

/// A job handed to a worker of this process.
struct Lease {
    worker_id: String,
    job: Job,
}

/// State for the queue actor.
pub struct QueueActorState {
    name: String,
    config: QueueConfig,
    repo: JobRepository,
    /// Sequence number given to the next enqueued job.
    next_seq: u64,
    /// Creation time of the last enqueued job; ids embed it.
    last_created: Option<DateTime<Utc>>,
    /// Jobs leased by workers of this process.
    leased: HashMap<JobId, Lease>,
    /// Dependency waiters by job.
    watchers: HashMap<JobId, Vec<RpcReplyPort<JobOutcome>>>,
    lifecycle: Option<ActorRef<LifecycleMessage>>,
    event_tx: broadcast::Sender<JobEvent>,
}

impl QueueActorState {
    /// Broadcast an event.
    fn broadcast(&self, event: JobEvent) {
        tracing::debug!("{}", event.description());
        let _ = self.event_tx.send(event);
    }

    /// Wake the lifecycle manager, if one is attached.
    fn notify_lifecycle(&self) {
        if let Some(ref lifecycle) = self.lifecycle
            && let Err(e) = lifecycle.send_message(LifecycleMessage::EnsureRunning)
        {
            tracing::warn!("Failed to notify lifecycle of {}: {}", self.name, e);
        }
    }

    fn resolve_watchers(&mut self, job_id: &JobId, outcome: JobOutcome) {
        if let Some(ports) = self.watchers.remove(job_id) {
            for port in ports {
                let _ = port.send(outcome.clone());
            }
        }
    }

    async fn enqueue(
        &mut self,
        myself: &ActorRef<QueueMessage>,
        subject_id: String,
        options: EnqueueOptions,
    ) -> Result<Job, QueueError> {
        if let Some(existing) = self
            .repo
            .find_in_flight(&self.name, &subject_id)
            .await
            .map_err(storage_err)?
        {
            return Err(QueueError::Conflict {
                queue: self.name.clone(),
                subject_id,
                job_id: existing.id,
            });
        }

        // Keep creation times strictly increasing so derived ids never repeat.
        let mut now = Utc::now();
        if let Some(last) = self.last_created
            && now.timestamp_millis() <= last.timestamp_millis()
        {
            now = last + TimeDelta::milliseconds(1);
        }
        let mut job = Job::new(&self.name, subject_id, options.payload, self.next_seq, now);

        if let Some(delay) = options.delay.filter(|d| !d.is_zero()) {
            let offset = TimeDelta::from_std(delay)
                .map_err(|e| QueueError::Invalid(format!("delay out of range: {e}")))?;
            job = job.delayed_until(now + offset);
        }

        let job = self.repo.insert(&job).await.map_err(storage_err)?;
        self.next_seq += 1;
        self.last_created = Some(job.created_at);

        if let Some(run_at) = job.run_at {
            schedule_promotion(myself, run_at);
        }

        Ok(job)
    }

    async fn lease_next(&mut self, worker_id: String) -> Option<Job> {
        if self.leased.len() >= self.config.concurrency as usize {
            return None;
        }

        let mut job = match self.repo.next_waiting(&self.name).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                self.broadcast(JobEvent::QueueDrained {
                    queue: self.name.clone(),
                    worker_id,
                    timestamp: Utc::now(),
                });
                return None;
            }
            Err(e) => {
                tracing::warn!("Failed to fetch next job from {}: {}", self.name, e);
                return None;
            }
        };

        let now = Utc::now();
        job.state = JobState::Active;
        job.processed_at = Some(now);

        if let Err(e) = self.repo.save(&job).await {
            tracing::warn!("Failed to mark job {} active: {}", job.id, e);
            return None;
        }

        self.broadcast(JobEvent::JobStarted {
            job_id: job.id.clone(),
            queue: self.name.clone(),
            worker_id: worker_id.clone(),
            timestamp: now,
        });
        self.leased.insert(
            job.id.clone(),
            Lease {
                worker_id,
                job: job.clone(),
            },
        );

        Some(job)
    }

    async fn record_progress(&mut self, job_id: JobId, progress: u8) {
        let Some(Lease { job, .. }) = self.leased.get_mut(&job_id) else {
            return;
        };

        let progress = progress.min(99);
        if progress <= job.progress {
            return;
        }
        job.progress = progress;
        let job = job.clone();

        if let Err(e) = self.repo.save(&job).await {
            tracing::warn!("Failed to record progress of {}: {}", job_id, e);
        }

        self.broadcast(JobEvent::JobProgress {
            job_id,
            queue: self.name.clone(),
            progress,
            timestamp: Utc::now(),
        });
    }

    /// Mark a leased job completed.
    async fn complete(
        &mut self,
        myself: &ActorRef<QueueMessage>,
        job_id: JobId,
        result: JobResult,
    ) {
        let Some(Lease { job, .. }) = self.leased.get_mut(&job_id) else {
            tracing::warn!("Completion reported for unknown job {}", job_id);
            return;
        };
        if job.state.is_terminal() {
            return;
        }

        job.state = JobState::Completed;
        job.progress = 100;
        job.finished_at = Some(Utc::now());
        job.result = Some(result);

        self.finish(myself, job_id).await;
    }

    /// Mark a leased job failed.
    async fn fail(&mut self, myself: &ActorRef<QueueMessage>, job_id: JobId, error: String) {
        let Some(Lease { job, .. }) = self.leased.get_mut(&job_id) else {
            tracing::warn!("Failure reported for unknown job {}", job_id);
            return;
        };
        if job.state.is_terminal() {
            return;
        }

        job.state = JobState::Failed;
        job.finished_at = Some(Utc::now());
        job.failure_reason = Some(error);

        self.finish(myself, job_id).await;
    }

    /// Store the final state of a leased job, then release it.
    ///
    /// Until the store succeeds the job keeps its lease: watchers stay
    /// pending and the stored record is what `status_for` and the conflict
    /// check see.
    async fn finish(&mut self, myself: &ActorRef<QueueMessage>, job_id: JobId) {
        let Some(job) = self.leased.get(&job_id).map(|lease| lease.job.clone()) else {
            return;
        };

        if let Err(e) = self.repo.save(&job).await {
            tracing::error!(
                "Failed to store final state of job {}, retrying in {}ms: {}",
                job_id,
                FINISH_RETRY_DELAY.as_millis(),
                e
            );
            let myself = myself.clone();
            tokio::spawn(async move {
                tokio::time::sleep(FINISH_RETRY_DELAY).await;
                let _ = myself.send_message(QueueMessage::RetryFinish { job_id });
            });
            return;
        }
        self.leased.remove(&job_id);

        let now = job.finished_at.unwrap_or_else(Utc::now);
        let outcome = match job.state {
            JobState::Completed => {
                self.broadcast(JobEvent::JobProgress {
                    job_id: job_id.clone(),
                    queue: self.name.clone(),
                    progress: 100,
                    timestamp: now,
                });
                self.broadcast(JobEvent::JobCompleted {
                    job_id: job_id.clone(),
                    queue: self.name.clone(),
                    duration_ms: job.duration_ms().unwrap_or(0),
                    timestamp: now,
                });
                JobOutcome::Completed(job.result.unwrap_or_else(|| JobResult::new("completed")))
            }
            _ => {
                let error = job.failure_reason.unwrap_or_default();
                self.broadcast(JobEvent::JobFailed {
                    job_id: job_id.clone(),
                    queue: self.name.clone(),
                    error: error.clone(),
                    timestamp: now,
                });
                JobOutcome::Failed(error)
            }
        };

        self.resolve_watchers(&job_id, outcome);
        self.prune(job.state).await;
    }

    async fn prune(&self, state: JobState) {
        let retention = &self.config.retention;
        let (max_age, max_count) = match state {
            JobState::Completed => (retention.completed_max_age(), retention.completed_max_count),
            _ => (retention.failed_max_age(), retention.failed_max_count),
        };

        if let Err(e) = self
            .repo
            .prune(&self.name, state, max_age, max_count, Utc::now())
            .await
        {
            tracing::warn!("Failed to prune {} jobs of {}: {}", state, self.name, e);
        }
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let by_state = self
            .repo
            .count_by_state(&self.name)
            .await
            .map_err(storage_err)?;
        let count = |state| by_state.get(&state).copied().unwrap_or(0);

        let leased = self.leased.len() as u64;
        Ok(QueueCounts {
            waiting: count(JobState::Waiting),
            delayed: count(JobState::Delayed),
            active: leased,
            orphaned: count(JobState::Active).saturating_sub(leased),
            completed: count(JobState::Completed),
            failed: count(JobState::Failed),
        })
    }

    async fn watch(&mut self, job_id: JobId, reply: RpcReplyPort<JobOutcome>) {
        drop_closed_watchers(&mut self.watchers);

        if self.leased.contains_key(&job_id) {
            self.watchers.entry(job_id).or_default().push(reply);
            return;
        }

        match self.repo.get(&job_id).await {
            Ok(Some(job)) => match job.state {
                JobState::Completed => {
                    let result = job.result.unwrap_or_else(|| JobResult::new("completed"));
                    let _ = reply.send(JobOutcome::Completed(result));
                }
                JobState::Failed => {
                    let reason = job.failure_reason.unwrap_or_default();
                    let _ = reply.send(JobOutcome::Failed(reason));
                }
                _ => self.watchers.entry(job_id).or_default().push(reply),
            },
            Ok(None) => {
                let _ = reply.send(JobOutcome::Missing);
            }
            Err(e) => {
                tracing::warn!("Failed to look up watched job {}: {}", job_id, e);
                let _ = reply.send(JobOutcome::Missing);
            }
        }
    }

    async fn promote_delayed(&mut self, myself: &ActorRef<QueueMessage>) -> Result<(), DbError> {
        let now = Utc::now();
        let due = self.repo.due_delayed(&self.name, now).await?;
        let promoted = due.len() as u64;

        for mut job in due {
            job.state = JobState::Waiting;
            self.repo.save(&job).await?;
        }

        if promoted > 0 {
            self.broadcast(JobEvent::JobsPromoted {
                queue: self.name.clone(),
                count: promoted,
                timestamp: now,
            });
            self.notify_lifecycle();
        }

        let next = self
            .repo
            .list_in_state(&self.name, JobState::Delayed)
            .await?
            .into_iter()
            .filter_map(|j| j.run_at)
            .min();
        if let Some(run_at) = next {
            schedule_promotion(myself, run_at);
        }

        Ok(())
    }
}

/// Forget waiters that stopped listening, e.g. after their timeout.
fn drop_closed_watchers(watchers: &mut HashMap<JobId, Vec<RpcReplyPort<JobOutcome>>>) {
    watchers.retain(|_, ports| {
        ports.retain(|port| !port.is_closed());
        !ports.is_empty()
    });
}

/// Arrange a `PromoteDelayed` message for `run_at`.
fn schedule_promotion(myself: &ActorRef<QueueMessage>, run_at: DateTime<Utc>) {
    let wait = (run_at - Utc::now()).to_std().unwrap_or_default();
    let myself = myself.clone();
    // Promotion is idempotent, so stray timers need no cancellation.
    tokio::spawn(async move {
        tokio::time::sleep(wait).await;
        let _ = myself.send_message(QueueMessage::PromoteDelayed);
    });
}

/// Queue actor that manages a single queue.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = QueueActorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting queue actor: {}", args.name);

        let next_seq = args.repo.max_seq(&args.name).await? + 1;

        let orphans = args.repo.list_in_state(&args.name, JobState::Active).await?;
        for job in &orphans {
            tracing::warn!(
                "Job {} in {} was left active by a previous process and will not be requeued",
                job.id,
                args.name
            );
        }

        // Pick up delayed jobs that were scheduled by a previous process.
        myself.send_message(QueueMessage::PromoteDelayed)?;

        Ok(QueueActorState {
            name: args.name,
            config: args.config,
            repo: args.repo,
            next_seq,
            last_created: None,
            leased: HashMap::new(),
            watchers: HashMap::new(),
            lifecycle: None,
            event_tx: args.event_tx,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Enqueue {
                subject_id,
                options,
                reply,
            } => {
                let result = state.enqueue(&myself, subject_id, options).await;

                if let Ok(ref job) = result {
                    state.broadcast(JobEvent::JobEnqueued {
                        job: job.clone(),
                        timestamp: Utc::now(),
                    });
                    // The manager hears about the job before the caller does.
                    if job.state == JobState::Waiting {
                        state.notify_lifecycle();
                    }
                }

                let _ = reply.send(result);
            }

            QueueMessage::RequestJob { worker_id, reply } => {
                let job = state.lease_next(worker_id).await;
                let _ = reply.send(job);
            }

            QueueMessage::Progress { job_id, progress } => {
                state.record_progress(job_id, progress).await;
            }

            QueueMessage::JobCompleted {
                job_id,
                worker_id: _,
                result,
            } => {
                state.complete(&myself, job_id, result).await;
            }

            QueueMessage::JobFailed {
                job_id,
                worker_id: _,
                error,
            } => {
                state.fail(&myself, job_id, error).await;
            }

            QueueMessage::GetJob { job_id, reply } => {
                let job = match state.leased.get(&job_id) {
                    Some(lease) => Ok(Some(lease.job.clone())),
                    None => state.repo.get(&job_id).await.map_err(storage_err),
                };
                let _ = reply.send(job);
            }

            QueueMessage::StatusFor { subject_id, reply } => {
                let view = status::project(&state.repo, &state.name, &subject_id)
                    .await
                    .map_err(storage_err);
                let _ = reply.send(view);
            }

            QueueMessage::GetConfig { reply } => {
                let _ = reply.send(state.config.clone());
            }

            QueueMessage::Counts { reply } => {
                let _ = reply.send(state.counts().await);
            }

            QueueMessage::Watch { job_id, reply } => {
                state.watch(job_id, reply).await;
            }

            QueueMessage::WorkerLost { worker_id, reason } => {
                let lost: Vec<JobId> = state
                    .leased
                    .iter()
                    .filter(|(_, lease)| lease.worker_id == worker_id)
                    .map(|(id, _)| id.clone())
                    .collect();
                for job_id in lost {
                    let reason = format!("worker terminated: {reason}");
                    state.fail(&myself, job_id, reason).await;
                }
            }

            QueueMessage::AttachLifecycle { lifecycle } => {
                state.lifecycle = Some(lifecycle);
            }

            QueueMessage::PromoteDelayed => {
                if let Err(e) = state.promote_delayed(&myself).await {
                    tracing::warn!("Failed to promote delayed jobs of {}: {}", state.name, e);
                }
            }

            QueueMessage::RetryFinish { job_id } => {
                state.finish(&myself, job_id).await;
            }

            QueueMessage::Shutdown => {
                tracing::info!("Shutting down queue: {}", state.name);
                myself.stop(None);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ractor::concurrency::oneshot;

    use super::*;

    #[test]
    fn closed_watchers_are_dropped() {
        let mut watchers: HashMap<JobId, Vec<RpcReplyPort<JobOutcome>>> = HashMap::new();

        let (gone_tx, gone_rx) = oneshot::<JobOutcome>();
        let (live_tx, _live_rx) = oneshot::<JobOutcome>();
        let (other_tx, other_rx) = oneshot::<JobOutcome>();
        drop(gone_rx);
        drop(other_rx);

        let job = JobId::from("synthesis-p1-1");
        watchers.insert(job.clone(), vec![gone_tx.into(), live_tx.into()]);
        watchers.insert(JobId::from("synthesis-p2-2"), vec![other_tx.into()]);

        drop_closed_watchers(&mut watchers);

        assert_eq!(watchers.len(), 1);
        assert_eq!(watchers.get(&job).map(Vec::len), Some(1));
    }
}
