#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actors::{QueueHandle, QueueSystem};
use bytes::Bytes;
use db::DbConfig;
use futures_util::future::BoxFuture;
use pipelines::collaborators::CollaboratorResult;
use pipelines::{
    ArtifactStore, CollaboratorError, Collaborators, ContextResolver, DERIVATION_QUEUE,
    DerivationPipeline, MarkdownGenerator, PipelineConfig, RetryPolicy, SYNTHESIS_QUEUE,
    SubjectContext, SummaryProvider, SynthesisPipeline, UnitSummary,
};
use queue_core::QueueConfig;

pub type TestResult = Result<(), Box<dyn Error>>;

/// Subjects known by id.
#[derive(Default)]
pub struct StaticResolver {
    subjects: HashMap<String, SubjectContext>,
}

impl StaticResolver {
    pub fn with_subject(mut self, subject_id: &str, units: usize) -> Self {
        let context = SubjectContext {
            subject_id: subject_id.to_string(),
            name: format!("Subject {subject_id}"),
            description: String::new(),
            unit_ids: (1..=units).map(|i| format!("{subject_id}-u{i}")).collect(),
        };
        self.subjects.insert(subject_id.to_string(), context);
        self
    }
}

impl ContextResolver for StaticResolver {
    fn resolve<'a>(
        &'a self,
        subject_id: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<SubjectContext>> {
        Box::pin(async move {
            self.subjects
                .get(subject_id)
                .cloned()
                .ok_or_else(|| CollaboratorError::NotFound(format!("subject {subject_id}")))
        })
    }
}

/// Summaries that always fail for the listed units.
#[derive(Default)]
pub struct FlakySummaries {
    failing: HashSet<String>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl FlakySummaries {
    pub fn failing(units: &[&str]) -> Self {
        Self {
            failing: units.iter().map(|u| u.to_string()).collect(),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn attempts(&self, unit_id: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(unit_id)
            .copied()
            .unwrap_or(0)
    }
}

impl SummaryProvider for FlakySummaries {
    fn ensure_summary<'a>(&'a self, unit_id: &'a str) -> BoxFuture<'a, CollaboratorResult<()>> {
        Box::pin(async move {
            *self
                .attempts
                .lock()
                .unwrap()
                .entry(unit_id.to_string())
                .or_default() += 1;
            if self.failing.contains(unit_id) {
                Err(CollaboratorError::Failed(format!("{unit_id} unreadable")))
            } else {
                Ok(())
            }
        })
    }

    fn summary<'a>(
        &'a self,
        unit_id: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<Option<UnitSummary>>> {
        Box::pin(async move {
            Ok(Some(UnitSummary {
                unit_id: unit_id.to_string(),
                facts: vec![format!("fact from {unit_id}"), "shared fact".to_string()],
            }))
        })
    }
}

/// Artifact store keeping writes in memory.
#[derive(Default)]
pub struct MemoryArtifacts {
    pub writes: Mutex<Vec<(String, String, Bytes)>>,
}

impl MemoryArtifacts {
    pub fn count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

impl ArtifactStore for MemoryArtifacts {
    fn write<'a>(
        &'a self,
        bytes: Bytes,
        name: &'a str,
        scope: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<String>> {
        Box::pin(async move {
            self.writes
                .lock()
                .unwrap()
                .push((name.to_string(), scope.to_string(), bytes));
            Ok(format!("memory://artifacts/{scope}/{name}"))
        })
    }
}

/// Fast settings: no inter-unit pause, millisecond backoff.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_unit_retry(RetryPolicy::new(3, Duration::from_millis(1)))
        .with_inter_unit_delay(Duration::ZERO)
}

pub struct Harness {
    pub system: QueueSystem,
    pub synthesis: QueueHandle,
    pub derivation: QueueHandle,
    pub summaries: Arc<FlakySummaries>,
    pub artifacts: Arc<MemoryArtifacts>,
}

/// Both queues over a fresh database; the synthesis processor is attached
/// only if `attach_synthesis` is set.
pub async fn harness(
    resolver: StaticResolver,
    summaries: FlakySummaries,
    config: PipelineConfig,
    attach_synthesis: bool,
) -> Result<Harness, Box<dyn Error>> {
    let db = db::init(DbConfig::memory()).await?;
    let system = QueueSystem::new(
        db,
        QueueConfig::default().with_idle_timeout(Duration::from_millis(500)),
    );

    let summaries = Arc::new(summaries);
    let artifacts = Arc::new(MemoryArtifacts::default());
    let collaborators = Collaborators {
        resolver: Arc::new(resolver),
        summaries: summaries.clone(),
        generator: Arc::new(MarkdownGenerator::new()),
        artifacts: artifacts.clone(),
    };

    let synthesis = system.open_queue(SYNTHESIS_QUEUE).await?;
    let derivation = system.open_queue(DERIVATION_QUEUE).await?;

    if attach_synthesis {
        let pipeline = SynthesisPipeline::new(collaborators.clone(), config.clone());
        system.attach(&synthesis, Arc::new(pipeline)).await?;
    }
    let pipeline = DerivationPipeline::new(collaborators, synthesis.clone(), config);
    system.attach(&derivation, Arc::new(pipeline)).await?;

    Ok(Harness {
        system,
        synthesis,
        derivation,
        summaries,
        artifacts,
    })
}
