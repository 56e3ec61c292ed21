//! Boot sequence: database, artifact store, queues and their processors.

use std::sync::Arc;

use actors::{QueueHandle, QueueSystem};
use db::DbError;
use db::repositories::CatalogRepository;
use pipelines::{
    Collaborators, DERIVATION_QUEUE, DerivationPipeline, MarkdownGenerator, SYNTHESIS_QUEUE,
    SynthesisPipeline,
};
use queue_core::QueueError;
use storage::{Storage, StorageError};
use thiserror::Error;

use crate::catalog::{CatalogResolver, CatalogSummaries};
use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("database: {0}")]
    Db(#[from] DbError),

    #[error("artifact storage: {0}")]
    Storage(#[from] StorageError),

    #[error("queue: {0}")]
    Queue(#[from] QueueError),
}

/// A running system with both pipelines attached.
pub struct Runtime {
    pub system: QueueSystem,
    pub synthesis: QueueHandle,
    pub derivation: QueueHandle,
    pub catalog: CatalogRepository,
}

impl Runtime {
    /// Stop every worker and queue; unfinished jobs stay for the next boot.
    pub async fn shutdown(&self) {
        self.system.stop().await;
    }
}

/// Initialize the job processing system.
///
/// Attaching a processor runs the queue's one-off startup reconciliation, so
/// jobs left waiting by a previous process start right away.
pub async fn init(config: AppConfig) -> Result<Runtime, InitError> {
    tracing::info!("Initializing job processing system...");

    let db = db::init(config.db).await?;
    let storage = Storage::new(config.storage).await?;

    let catalog = CatalogRepository::new(db.clone());
    let generator = Arc::new(MarkdownGenerator::new());
    let collaborators = Collaborators {
        resolver: Arc::new(CatalogResolver::new(catalog.clone())),
        summaries: Arc::new(CatalogSummaries::new(catalog.clone(), generator.clone())),
        generator,
        artifacts: Arc::new(storage),
    };

    let system = QueueSystem::new(db, config.queue);
    let synthesis = system.open_queue(SYNTHESIS_QUEUE).await?;
    let derivation = system.open_queue(DERIVATION_QUEUE).await?;

    let pipeline = SynthesisPipeline::new(collaborators.clone(), config.pipeline.clone());
    system.attach(&synthesis, Arc::new(pipeline)).await?;

    let pipeline = DerivationPipeline::new(collaborators, synthesis.clone(), config.pipeline);
    system.attach(&derivation, Arc::new(pipeline)).await?;

    tracing::info!(
        "Job processing system ready (queues: {})",
        system.registry().list_queues().join(", ")
    );

    Ok(Runtime {
        system,
        synthesis,
        derivation,
        catalog,
    })
}
