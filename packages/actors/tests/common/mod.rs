#![allow(dead_code)]

use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use actors::{FnProcessor, JobContext, JobProcessor, ProcessFuture, QueueSystem, WorkerState};
use db::{Database, DbConfig};
use queue_core::{Job, JobEvent, JobResult, QueueConfig};
use tokio::sync::broadcast;

pub type TestResult = Result<(), Box<dyn Error>>;

/// Open an isolated in-memory database with the schema applied.
pub async fn setup_db() -> Result<Database, Box<dyn Error>> {
    Ok(db::init(DbConfig::memory()).await?)
}

/// A system over a fresh database with a short idle timeout.
pub async fn setup_system(idle_timeout: Duration) -> Result<QueueSystem, Box<dyn Error>> {
    let db = setup_db().await?;
    Ok(QueueSystem::new(
        db,
        QueueConfig::default().with_idle_timeout(idle_timeout),
    ))
}

/// Wrap a closure as a shared processor.
pub fn processor<F>(f: F) -> Arc<dyn JobProcessor>
where
    F: Fn(Job, JobContext) -> ProcessFuture + Send + Sync + 'static,
{
    Arc::new(FnProcessor::new(f))
}

/// A processor completing every job right away with the subject as summary.
pub fn echo() -> Arc<dyn JobProcessor> {
    processor(|job, _ctx| Box::pin(async move { Ok(JobResult::new(job.subject_id)) }))
}

/// A processor that sleeps before completing.
pub fn sleepy(delay: Duration) -> Arc<dyn JobProcessor> {
    processor(move |job, _ctx| {
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(JobResult::new(job.subject_id))
        })
    })
}

/// Poll `check` every 10ms until it holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until the worker of `queue` reaches `state`.
pub async fn wait_for_state(
    system: &QueueSystem,
    queue: &str,
    state: WorkerState,
    timeout: Duration,
) -> bool {
    eventually(timeout, || async { system.worker_state(queue).await == state }).await
}

/// Receive events until one matches, or give up after `timeout`.
pub async fn next_matching<F>(
    rx: &mut broadcast::Receiver<JobEvent>,
    timeout: Duration,
    mut pred: F,
) -> Option<JobEvent>
where
    F: FnMut(&JobEvent) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}
