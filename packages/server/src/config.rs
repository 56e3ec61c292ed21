//! Process configuration read from the environment.

use std::str::FromStr;
use std::time::Duration;

use db::DbConfig;
use pipelines::{PipelineConfig, RetryPolicy};
use queue_core::{QueueConfig, RetentionPolicy};
use storage::{StorageConfig, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Everything the server needs to boot.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db: DbConfig,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// In-memory database and artifact store with default tuning.
    pub fn memory() -> Self {
        Self {
            db: DbConfig::memory(),
            storage: StorageConfig::memory(),
            queue: QueueConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();
        Ok(Self {
            db: DbConfig::from_env(),
            storage: StorageConfig::from_env()?,
            queue: queue_config_from(lookup)?,
            pipeline: pipeline_config_from(lookup)?,
        })
    }
}

/// Parse `key` with `lookup`, keeping `default` when unset or blank.
fn parse_or<T, L>(lookup: &L, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

/// Queue settings from `QUEUE_*` variables.
///
/// Failed-job bounds default to seven times the completed ones.
pub fn queue_config_from<L>(lookup: L) -> Result<QueueConfig, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    let defaults = QueueConfig::default();

    let completed_age = parse_or(
        &lookup,
        "QUEUE_COMPLETED_MAX_AGE_SECS",
        defaults.retention.completed_max_age_secs,
    )?;
    let completed_count = parse_or(
        &lookup,
        "QUEUE_COMPLETED_MAX_COUNT",
        defaults.retention.completed_max_count,
    )?;
    let derived = RetentionPolicy::keep_completed(completed_age, completed_count);
    let retention = RetentionPolicy {
        failed_max_age_secs: parse_or(
            &lookup,
            "QUEUE_FAILED_MAX_AGE_SECS",
            derived.failed_max_age_secs,
        )?,
        failed_max_count: parse_or(&lookup, "QUEUE_FAILED_MAX_COUNT", derived.failed_max_count)?,
        ..derived
    };

    Ok(QueueConfig {
        idle_timeout_ms: parse_or(&lookup, "QUEUE_IDLE_TIMEOUT_MS", defaults.idle_timeout_ms)?,
        retention,
        ..defaults
    }
    .with_concurrency(parse_or(&lookup, "QUEUE_CONCURRENCY", defaults.concurrency)?))
}

/// Pipeline settings from `PIPELINE_*` variables.
pub fn pipeline_config_from<L>(lookup: L) -> Result<PipelineConfig, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    let defaults = PipelineConfig::default();

    let attempts = parse_or(&lookup, "PIPELINE_UNIT_ATTEMPTS", defaults.unit_retry.max_attempts)?;
    let backoff_ms = parse_or(
        &lookup,
        "PIPELINE_UNIT_BACKOFF_MS",
        defaults.unit_retry.base_delay.as_millis() as u64,
    )?;
    let inter_unit_ms = parse_or(
        &lookup,
        "PIPELINE_INTER_UNIT_DELAY_MS",
        defaults.inter_unit_delay.as_millis() as u64,
    )?;
    let dependency_secs = parse_or(
        &lookup,
        "PIPELINE_DEPENDENCY_TIMEOUT_SECS",
        defaults.dependency_timeout.as_secs(),
    )?;

    Ok(defaults
        .with_unit_retry(RetryPolicy::new(attempts, Duration::from_millis(backoff_ms)))
        .with_inter_unit_delay(Duration::from_millis(inter_unit_ms))
        .with_dependency_timeout(Duration::from_secs(dependency_secs)))
}
