//! Pipeline tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Retry applied to each unit summary.
    pub unit_retry: RetryPolicy,
    /// Pause between two units, to spare the summary backend.
    pub inter_unit_delay: Duration,
    /// Cap on waiting for a dependency job.
    pub dependency_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            unit_retry: RetryPolicy::default(),
            inter_unit_delay: Duration::from_secs(2),
            dependency_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl PipelineConfig {
    pub fn with_unit_retry(mut self, retry: RetryPolicy) -> Self {
        self.unit_retry = retry;
        self
    }

    pub fn with_inter_unit_delay(mut self, delay: Duration) -> Self {
        self.inter_unit_delay = delay;
        self
    }

    pub fn with_dependency_timeout(mut self, timeout: Duration) -> Self {
        self.dependency_timeout = timeout;
        self
    }
}
