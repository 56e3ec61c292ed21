//! Queue configuration and bookkeeping types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long finished jobs are kept before the queue prunes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub completed_max_age_secs: u64,
    pub completed_max_count: usize,
    pub failed_max_age_secs: u64,
    pub failed_max_count: usize,
}

impl RetentionPolicy {
    /// Failed jobs are kept this many times longer than completed ones.
    pub const FAILED_FACTOR: u64 = 7;

    /// Build a policy whose failed bounds are derived from the completed ones.
    pub fn keep_completed(max_age_secs: u64, max_count: usize) -> Self {
        Self {
            completed_max_age_secs: max_age_secs,
            completed_max_count: max_count,
            failed_max_age_secs: max_age_secs * Self::FAILED_FACTOR,
            failed_max_count: max_count * Self::FAILED_FACTOR as usize,
        }
    }

    pub fn completed_max_age(&self) -> Duration {
        Duration::from_secs(self.completed_max_age_secs)
    }

    pub fn failed_max_age(&self) -> Duration {
        Duration::from_secs(self.failed_max_age_secs)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::keep_completed(24 * 60 * 60, 100)
    }
}

/// Configuration for queue and worker behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Jobs processed at once by the queue's worker.
    pub concurrency: u32,
    /// Grace period between the queue draining and its worker shutting down.
    pub idle_timeout_ms: u64,
    /// Retention of finished jobs.
    pub retention: RetentionPolicy,
}

impl QueueConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout_ms = idle_timeout.as_millis() as u64;
        self
    }

    pub fn with_concurrency(mut self, concurrency: u32) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            idle_timeout_ms: 60_000,
            retention: RetentionPolicy::default(),
        }
    }
}

/// Number of jobs per partition of a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueCounts {
    pub waiting: u64,
    pub delayed: u64,
    /// Jobs leased by a worker of this process.
    pub active: u64,
    /// Jobs left active by a previous process; never requeued automatically.
    pub orphaned: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueCounts {
    /// Jobs that still need a worker.
    pub fn pending(&self) -> u64 {
        self.waiting + self.delayed + self.active
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_jobs_are_kept_seven_times_longer() {
        let policy = RetentionPolicy::keep_completed(3600, 50);
        assert_eq!(policy.failed_max_age_secs, 3600 * 7);
        assert_eq!(policy.failed_max_count, 350);
    }

    #[test]
    fn orphans_do_not_count_as_pending() {
        let counts = QueueCounts {
            orphaned: 2,
            completed: 4,
            ..Default::default()
        };
        assert!(counts.is_idle());

        let busy = QueueCounts {
            delayed: 1,
            ..Default::default()
        };
        assert_eq!(busy.pending(), 1);
    }

    #[test]
    fn concurrency_never_drops_below_one() {
        assert_eq!(QueueConfig::default().with_concurrency(0).concurrency, 1);
        assert_eq!(QueueConfig::default().idle_timeout(), Duration::from_secs(60));
    }
}
