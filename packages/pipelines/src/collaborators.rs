//! Capabilities the pipelines consume.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use queue_core::JobResult;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),
}

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Static context of a subject of work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectContext {
    pub subject_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Units whose summaries feed the synthesis, in order.
    #[serde(default)]
    pub unit_ids: Vec<String>,
}

/// Facts derived from a single unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSummary {
    pub unit_id: String,
    pub facts: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    /// Condense a unit's raw text (in `facts`) into facts, one per line.
    UnitSummary,
    /// The primary document built from aggregated facts.
    Synthesis,
    /// Content derived from a finished synthesis (in `source`).
    Derivation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub kind: GenerationKind,
    pub context: SubjectContext,
    pub facts: Vec<String>,
    pub source: Option<JobResult>,
}

impl GenerationRequest {
    pub fn new(kind: GenerationKind, context: SubjectContext) -> Self {
        Self {
            kind,
            context,
            facts: Vec::new(),
            source: None,
        }
    }

    pub fn with_facts(mut self, facts: Vec<String>) -> Self {
        self.facts = facts;
        self
    }

    pub fn with_source(mut self, source: JobResult) -> Self {
        self.source = Some(source);
        self
    }
}

/// Looks up the static context of a subject.
pub trait ContextResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        subject_id: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<SubjectContext>>;
}

/// Prepares and serves per-unit summaries.
pub trait SummaryProvider: Send + Sync {
    /// Make sure the unit has a summary. Idempotent.
    fn ensure_summary<'a>(&'a self, unit_id: &'a str) -> BoxFuture<'a, CollaboratorResult<()>>;

    fn summary<'a>(
        &'a self,
        unit_id: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<Option<UnitSummary>>>;
}

/// The slow, occasionally failing content generator.
pub trait Generator: Send + Sync {
    fn generate(&self, request: GenerationRequest) -> BoxFuture<'_, CollaboratorResult<String>>;
}

/// Durable artifact storage; `write` returns the public URL.
pub trait ArtifactStore: Send + Sync {
    fn write<'a>(
        &'a self,
        bytes: Bytes,
        name: &'a str,
        scope: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<String>>;
}

impl ArtifactStore for storage::Storage {
    fn write<'a>(
        &'a self,
        bytes: Bytes,
        name: &'a str,
        scope: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<String>> {
        Box::pin(async move {
            self.write_artifact(bytes, name, scope)
                .await
                .map(|stored| stored.url)
                .map_err(|e| CollaboratorError::Failed(e.to_string()))
        })
    }
}

/// Everything a pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn ContextResolver>,
    pub summaries: Arc<dyn SummaryProvider>,
    pub generator: Arc<dyn Generator>,
    pub artifacts: Arc<dyn ArtifactStore>,
}
